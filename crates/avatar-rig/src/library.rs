//! Shared, read-only clip library.
//!
//! The clip table is authored on a Mixamo base skeleton, so raw track names
//! look like `mixamorigLeftArm.quaternion`. Ingestion resolves those names
//! to canonical bones once; clips that fail to decode are skipped with a
//! warning so the avatar can run with whatever subset loaded.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Quat, Vec3};

use crate::clip::{AnimationClip, ClipTags, Track};
use crate::error::{RigError, RigResult};
use crate::naming::{Mixamo, NamingDialect};

/// A track as stored in the clip table: flat `f32` values, three per
/// position key or four (`x, y, z, w`) per rotation key.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawTrack {
    pub name: String,
    pub times: Vec<f32>,
    pub values: Vec<f32>,
}

/// A clip as stored in the clip table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawClip {
    pub name: String,
    pub duration: f32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub tags: ClipTags,
    pub tracks: Vec<RawTrack>,
}

impl RawClip {
    /// Decode into a canonical clip. Tracks for bones outside the canonical
    /// set are dropped.
    pub fn decode(&self) -> RigResult<AnimationClip> {
        let mut tracks = Vec::with_capacity(self.tracks.len());
        for raw in &self.tracks {
            let Some((bone_name, property)) = raw.name.rsplit_once('.') else {
                return Err(self.load_error(format!("track '{}' has no property", raw.name)));
            };
            let Some(bone) = Mixamo.resolve(bone_name) else {
                tracing::debug!("Clip '{}': skipping track '{}'", self.name, raw.name);
                continue;
            };
            let stride = match property {
                "position" => 3,
                "quaternion" => 4,
                "scale" => continue,
                other => {
                    return Err(self.load_error(format!("unknown track property '{other}'")));
                }
            };
            if raw.values.len() != raw.times.len() * stride {
                return Err(self.load_error(format!(
                    "track '{}' has {} values for {} keys",
                    raw.name,
                    raw.values.len(),
                    raw.times.len()
                )));
            }
            let track = if stride == 3 {
                let values = raw.values.chunks_exact(3).map(Vec3::from_slice).collect();
                Track::position(bone, raw.times.clone(), values)
            } else {
                let values = raw
                    .values
                    .chunks_exact(4)
                    .map(|q| Quat::from_slice(q).normalize())
                    .collect();
                Track::rotation(bone, raw.times.clone(), values)
            };
            tracks.push(track);
        }
        Ok(AnimationClip::new(self.name.clone(), self.duration, tracks).with_tags(self.tags))
    }

    fn load_error(&self, reason: String) -> RigError {
        RigError::Load {
            what: format!("clip '{}'", self.name),
            reason,
        }
    }
}

/// Clip table shared by every avatar's blend tree.
#[derive(Debug, Clone, Default)]
pub struct ClipLibrary {
    clips: Vec<Arc<AnimationClip>>,
    by_name: HashMap<String, usize>,
}

impl ClipLibrary {
    #[must_use]
    pub fn new(clips: impl IntoIterator<Item = AnimationClip>) -> Self {
        let mut library = Self::default();
        for clip in clips {
            library.insert(clip);
        }
        library
    }

    /// Decode raw clips, skipping any that fail.
    #[must_use]
    pub fn from_raw(raw: &[RawClip]) -> Self {
        let mut library = Self::default();
        for clip in raw {
            match clip.decode() {
                Ok(clip) => library.insert(clip),
                Err(e) => tracing::warn!("Skipping clip: {}", e),
            }
        }
        tracing::info!("Loaded {} of {} clips", library.len(), raw.len());
        library
    }

    /// Parse a JSON clip table of the form `{"animations": [RawClip, ...]}`.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> RigResult<Self> {
        #[derive(serde::Deserialize)]
        struct Table {
            animations: Vec<RawClip>,
        }
        let table: Table = serde_json::from_str(json).map_err(|e| RigError::Load {
            what: "clip table".to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_raw(&table.animations))
    }

    /// Add a clip, replacing any clip with the same name.
    pub fn insert(&mut self, clip: AnimationClip) {
        if let Some(&index) = self.by_name.get(&clip.name) {
            self.clips[index] = Arc::new(clip);
        } else {
            self.by_name.insert(clip.name.clone(), self.clips.len());
            self.clips.push(Arc::new(clip));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<AnimationClip>> {
        self.by_name.get(name).map(|&i| &self.clips[i])
    }

    /// First clip, in insertion order, matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&AnimationClip) -> bool) -> Option<&Arc<AnimationClip>> {
        self.clips.iter().find(|clip| predicate(clip))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AnimationClip>> {
        self.clips.iter()
    }

    /// Give every named clip the duration of the first one times `factor`,
    /// so a group of cycles stays phase-locked. Missing names are skipped.
    pub fn phase_lock(&mut self, names: &[&str], factor: f32) {
        let Some(base) = names.first().and_then(|name| self.get(name)) else {
            return;
        };
        let duration = base.duration * factor;
        for name in &names[1..] {
            if let Some(&index) = self.by_name.get(*name) {
                Arc::make_mut(&mut self.clips[index]).retime(duration);
            }
        }
    }
}
