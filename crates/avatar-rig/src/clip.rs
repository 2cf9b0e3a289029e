//! Keyframed animation clips addressed by canonical bone.

use glam::{Quat, Vec3};

use crate::bone::{CanonicalBone, CanonicalMap};

/// Which part of a bone transform a track drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Position,
    Rotation,
}

/// Keyframe values of a track.
#[derive(Debug, Clone, PartialEq)]
pub enum Keyframes {
    Position(Vec<Vec3>),
    Rotation(Vec<Quat>),
}

/// One animated channel of one bone.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub bone: CanonicalBone,
    /// Ascending keyframe times in seconds.
    pub times: Vec<f32>,
    pub values: Keyframes,
}

impl Track {
    #[must_use]
    pub fn rotation(bone: CanonicalBone, times: Vec<f32>, values: Vec<Quat>) -> Self {
        Self {
            bone,
            times,
            values: Keyframes::Rotation(values),
        }
    }

    #[must_use]
    pub fn position(bone: CanonicalBone, times: Vec<f32>, values: Vec<Vec3>) -> Self {
        Self {
            bone,
            times,
            values: Keyframes::Position(values),
        }
    }

    #[must_use]
    pub fn channel(&self) -> Channel {
        match self.values {
            Keyframes::Position(_) => Channel::Position,
            Keyframes::Rotation(_) => Channel::Rotation,
        }
    }

    /// Keyframe pair surrounding `t` and the interpolation factor between
    /// them. Times outside the track clamp to the first or last key.
    fn segment(&self, t: f32) -> Option<(usize, usize, f32)> {
        let last = self.times.len().checked_sub(1)?;
        if t <= self.times[0] {
            return Some((0, 0, 0.0));
        }
        if t >= self.times[last] {
            return Some((last, last, 0.0));
        }
        let next = self.times.partition_point(|&time| time <= t);
        let prev = next - 1;
        let span = self.times[next] - self.times[prev];
        let factor = if span > 0.0 {
            (t - self.times[prev]) / span
        } else {
            0.0
        };
        Some((prev, next, factor))
    }

    fn sample_position(&self, t: f32) -> Option<Vec3> {
        let Keyframes::Position(values) = &self.values else {
            return None;
        };
        let (a, b, f) = self.segment(t)?;
        Some(values.get(a)?.lerp(*values.get(b)?, f))
    }

    fn sample_rotation(&self, t: f32) -> Option<Quat> {
        let Keyframes::Rotation(values) = &self.values else {
            return None;
        };
        let (a, b, f) = self.segment(t)?;
        Some(values.get(a)?.slerp(*values.get(b)?, f))
    }

    fn scale_times(&mut self, factor: f32) {
        for time in &mut self.times {
            *time *= factor;
        }
    }
}

/// Role flags attached to a clip by the clip table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
#[allow(clippy::struct_excessive_bools)]
pub struct ClipTags {
    pub is_idle: bool,
    pub is_jump: bool,
    pub is_charge_jump: bool,
    pub is_fall_loop: bool,
    pub is_sitting: bool,
    pub is_dance: bool,
    pub is_throw: bool,
    pub is_naruto_run: bool,
    pub is_float: bool,
    pub is_crouch: bool,
    pub is_backward: bool,
    pub is_combo: bool,
    pub is_use: bool,
    pub is_aim: bool,
    pub is_activate: bool,
}

/// An immutable named set of tracks.
#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub tags: ClipTags,
    tracks: Vec<Track>,
    rotations: CanonicalMap<usize>,
    positions: CanonicalMap<usize>,
}

impl AnimationClip {
    /// Build a clip. A later track for the same bone and channel replaces an
    /// earlier one.
    #[must_use]
    pub fn new(name: impl Into<String>, duration: f32, tracks: Vec<Track>) -> Self {
        let mut rotations = CanonicalMap::new();
        let mut positions = CanonicalMap::new();
        for (i, track) in tracks.iter().enumerate() {
            match track.channel() {
                Channel::Rotation => rotations.insert(track.bone, i),
                Channel::Position => positions.insert(track.bone, i),
            };
        }
        Self {
            name: name.into(),
            duration,
            tags: ClipTags::default(),
            tracks,
            rotations,
            positions,
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: ClipTags) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[must_use]
    pub fn has_track(&self, bone: CanonicalBone, channel: Channel) -> bool {
        match channel {
            Channel::Rotation => self.rotations.contains(bone),
            Channel::Position => self.positions.contains(bone),
        }
    }

    /// Interpolated (spherical) rotation of `bone` at `t` seconds.
    #[must_use]
    pub fn sample_rotation(&self, bone: CanonicalBone, t: f32) -> Option<Quat> {
        self.tracks[*self.rotations.get(bone)?].sample_rotation(t)
    }

    /// Interpolated (linear) position of `bone` at `t` seconds.
    #[must_use]
    pub fn sample_position(&self, bone: CanonicalBone, t: f32) -> Option<Vec3> {
        self.tracks[*self.positions.get(bone)?].sample_position(t)
    }

    /// `t` wrapped into `[0, duration)`; zero-length clips always sample at 0.
    #[must_use]
    pub fn wrap(&self, t: f32) -> f32 {
        if self.duration > 0.0 {
            t.rem_euclid(self.duration)
        } else {
            0.0
        }
    }

    /// Stretch the clip so it lasts `duration` seconds.
    pub fn retime(&mut self, duration: f32) {
        if self.duration <= 0.0 || duration <= 0.0 {
            return;
        }
        let factor = duration / self.duration;
        for track in &mut self.tracks {
            track.scale_times(factor);
        }
        self.duration = duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip() -> AnimationClip {
        AnimationClip::new(
            "wave",
            2.0,
            vec![
                Track::rotation(
                    CanonicalBone::Head,
                    vec![0.0, 2.0],
                    vec![Quat::IDENTITY, Quat::from_rotation_y(1.0)],
                ),
                Track::position(
                    CanonicalBone::Hips,
                    vec![0.0, 1.0, 2.0],
                    vec![Vec3::ZERO, Vec3::Y, Vec3::ZERO],
                ),
            ],
        )
    }

    #[test]
    fn samples_interpolate_between_keys() {
        let clip = clip();
        let half = clip.sample_rotation(CanonicalBone::Head, 1.0).unwrap();
        assert!(half.abs_diff_eq(Quat::from_rotation_y(0.5), 1e-5));
        let p = clip.sample_position(CanonicalBone::Hips, 0.5).unwrap();
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.5, 0.0), 1e-6));
    }

    #[test]
    fn samples_clamp_outside_range() {
        let clip = clip();
        let end = clip.sample_rotation(CanonicalBone::Head, 9.0).unwrap();
        assert!(end.abs_diff_eq(Quat::from_rotation_y(1.0), 1e-6));
        assert_eq!(clip.sample_rotation(CanonicalBone::Spine, 0.0), None);
        assert_eq!(clip.sample_position(CanonicalBone::Head, 0.0), None);
    }

    #[test]
    fn retime_scales_keys() {
        let mut clip = clip();
        clip.retime(4.0);
        assert_eq!(clip.duration, 4.0);
        let p = clip.sample_position(CanonicalBone::Hips, 2.0).unwrap();
        assert!(p.abs_diff_eq(Vec3::Y, 1e-6));
        assert!((clip.wrap(5.0) - 1.0).abs() < 1e-6);
    }
}
