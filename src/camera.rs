pub mod probe;

use std::fmt;

/// Opaque address of a camera, handed to the capture backend as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceId {
    LocalDevice(u32), // /dev/videoN
    Uri(String),
    TestPattern,
}

impl SourceId {
    pub fn is_local(&self) -> bool {
        !matches!(self, SourceId::Uri(_))
    }
}

/// Never prints credentials embedded in a URI.
impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::LocalDevice(index) => write!(f, "local device #{index}"),
            SourceId::TestPattern => f.write_str("test pattern"),
            SourceId::Uri(uri) => match (uri.find("://"), uri.rfind('@')) {
                (Some(scheme_end), Some(at)) if at > scheme_end => {
                    write!(f, "{}***{}", &uri[..scheme_end + 3], &uri[at..])
                }
                _ => f.write_str(uri),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSource {
    pub id: SourceId,
    pub name: String,
}

impl CameraSource {
    pub fn local(index: u32) -> Self {
        Self {
            id: SourceId::LocalDevice(index),
            name: format!("Local camera {index}"),
        }
    }

    pub fn network(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: SourceId::Uri(uri.into()),
            name: name.into(),
        }
    }

    pub fn test_pattern() -> Self {
        Self {
            id: SourceId::TestPattern,
            name: "Test pattern".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    Active(SourceId),
    Failed { id: SourceId, reason: String },
}

// 本地摄像头永远是第一项
#[derive(Debug)]
pub struct Registry {
    sources: Vec<CameraSource>,
    selection: Selection,
}

impl Registry {
    pub fn new(local: CameraSource) -> Self {
        Self {
            sources: vec![local],
            selection: Selection::None,
        }
    }

    pub fn sources(&self) -> &[CameraSource] {
        &self.sources
    }

    pub fn get(&self, id: &SourceId) -> Option<&CameraSource> {
        self.sources.iter().find(|source| &source.id == id)
    }

    /// Adds a source. Returns `false` if one with the same id already exists.
    pub fn register(&mut self, source: CameraSource) -> bool {
        if self.get(&source.id).is_some() {
            return false;
        }
        self.sources.push(source);
        true
    }

    /// Last registered network camera, else the local one.
    pub fn preferred(&self) -> &CameraSource {
        self.sources
            .iter()
            .rev()
            .find(|source| !source.id.is_local())
            .unwrap_or(&self.sources[0])
    }

    pub fn local(&self) -> &CameraSource {
        &self.sources[0]
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selected(&self) -> Option<&SourceId> {
        match &self.selection {
            Selection::Active(id) => Some(id),
            _ => None,
        }
    }

    pub fn mark_active(&mut self, id: SourceId) {
        self.selection = Selection::Active(id);
    }

    pub fn mark_failed(&mut self, id: SourceId, reason: impl Into<String>) {
        self.selection = Selection::Failed {
            id,
            reason: reason.into(),
        };
    }

    pub fn clear_selection(&mut self) {
        self.selection = Selection::None;
    }
}
