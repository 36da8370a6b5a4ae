use serde::Serialize;

use super::kind::TrackKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackDef {
    pub name: String,
    pub kind: TrackKind,
}

/// The fixed set of tracks a store serves, in declaration order. Built once at
/// startup from configuration and handed to the store by value.
#[derive(Debug, Clone, Default)]
pub struct TrackRegistry {
    tracks: Vec<TrackDef>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a track. Returns false if the name is already taken.
    pub fn register(&mut self, name: impl Into<String>, kind: TrackKind) -> bool {
        let name = name.into();
        if self.get(&name).is_some() {
            return false;
        }
        self.tracks.push(TrackDef { name, kind });
        true
    }

    #[cfg(test)]
    pub fn with(mut self, name: &str, kind: TrackKind) -> Self {
        self.register(name, kind);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TrackDef> {
        self.tracks.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackDef> {
        self.tracks.iter()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
