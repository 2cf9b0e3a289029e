//! Facial expressions: visemes, blinking and emotes on morph targets.

use std::collections::HashMap;

use noise::{NoiseFn, OpenSimplex};

use crate::binder::SkinnedMesh;
use crate::state::AvatarState;

/// Blink cycle length in milliseconds.
const BLINK_PERIOD_MS: f64 = 2000.0;
/// Duration of each half (close, open) of a blink.
const BLINK_HALF_MS: f64 = 100.0;

/// Blend-shape presets a model may bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExpressionPreset {
    A,
    E,
    I,
    O,
    U,
    Blink,
    BlinkL,
    BlinkR,
    Neutral,
    Angry,
    Fun,
    Joy,
    Sorrow,
}

impl ExpressionPreset {
    pub const ALL: [Self; 13] = [
        Self::A,
        Self::E,
        Self::I,
        Self::O,
        Self::U,
        Self::Blink,
        Self::BlinkL,
        Self::BlinkR,
        Self::Neutral,
        Self::Angry,
        Self::Fun,
        Self::Joy,
        Self::Sorrow,
    ];

    pub const VOWELS: [Self; 5] = [Self::A, Self::E, Self::I, Self::O, Self::U];

    /// Guess the preset a morph target drives from its name.
    #[must_use]
    pub fn from_morph_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let stem = lower
            .strip_prefix("fcl_")
            .or_else(|| lower.strip_prefix("vrc."))
            .unwrap_or(&lower);
        Some(match stem {
            "mth_a" | "a" | "aa" | "v_aa" => Self::A,
            "mth_e" | "e" | "v_e" => Self::E,
            "mth_i" | "i" | "ih" | "v_ih" => Self::I,
            "mth_o" | "o" | "oh" | "v_oh" => Self::O,
            "mth_u" | "u" | "ou" | "v_ou" => Self::U,
            "eye_close" | "blink" => Self::Blink,
            "eye_close_l" | "blink_l" | "blinkleft" => Self::BlinkL,
            "eye_close_r" | "blink_r" | "blinkright" => Self::BlinkR,
            "all_neutral" | "neutral" => Self::Neutral,
            "all_angry" | "angry" => Self::Angry,
            "all_fun" | "fun" => Self::Fun,
            "all_joy" | "joy" => Self::Joy,
            "all_sorrow" | "sorrow" => Self::Sorrow,
            _ => return None,
        })
    }
}

/// Emote shown on the face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emote {
    Neutral,
    Angry,
    Fun,
    Joy,
    Sorrow,
}

impl Emote {
    #[must_use]
    pub fn preset(self) -> ExpressionPreset {
        match self {
            Self::Neutral => ExpressionPreset::Neutral,
            Self::Angry => ExpressionPreset::Angry,
            Self::Fun => ExpressionPreset::Fun,
            Self::Joy => ExpressionPreset::Joy,
            Self::Sorrow => ExpressionPreset::Sorrow,
        }
    }
}

/// Lip-sync input for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeechInput {
    /// The avatar is talking without a live audio signal.
    pub fake: bool,
    /// Live microphone volume, if any.
    pub volume: Option<f32>,
    /// Vowel weights `[a, e, i, o, u]` from the viseme recognizer.
    pub vowels: [f32; 5],
}

/// One morph target driven by a preset.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MorphBind {
    pub mesh: usize,
    pub morph: usize,
    pub weight: f32,
}

/// Preset to morph-target bindings for a model.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExpressionBindings {
    presets: HashMap<ExpressionPreset, Vec<MorphBind>>,
}

impl ExpressionBindings {
    /// Bind presets by morph target name on every mesh.
    #[must_use]
    pub fn from_morph_names(meshes: &[SkinnedMesh]) -> Self {
        let mut bindings = Self::default();
        for (mesh_index, mesh) in meshes.iter().enumerate() {
            for (morph_index, name) in mesh.morph_targets.iter().enumerate() {
                if let Some(preset) = ExpressionPreset::from_morph_name(name) {
                    bindings.bind(
                        preset,
                        MorphBind {
                            mesh: mesh_index,
                            morph: morph_index,
                            weight: 1.0,
                        },
                    );
                }
            }
        }
        bindings
    }

    pub fn bind(&mut self, preset: ExpressionPreset, bind: MorphBind) {
        self.presets.entry(preset).or_default().push(bind);
    }

    #[must_use]
    pub fn get(&self, preset: ExpressionPreset) -> &[MorphBind] {
        self.presets.get(&preset).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn has(&self, preset: ExpressionPreset) -> bool {
        !self.get(preset).is_empty()
    }
}

/// Per-avatar expression evaluator.
pub struct ExpressionLayer {
    bindings: ExpressionBindings,
    noise: [OpenSimplex; 5],
    presets: HashMap<ExpressionPreset, f32>,
    morph_weights: Vec<Vec<f32>>,
}

impl std::fmt::Debug for ExpressionLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionLayer")
            .field("bindings", &self.bindings)
            .field("presets", &self.presets)
            .finish_non_exhaustive()
    }
}

impl ExpressionLayer {
    #[must_use]
    pub fn new(bindings: ExpressionBindings, meshes: &[SkinnedMesh]) -> Self {
        Self {
            bindings,
            noise: [0, 1, 2, 3, 4].map(OpenSimplex::new),
            presets: HashMap::new(),
            morph_weights: meshes
                .iter()
                .map(|m| vec![0.0; m.morph_targets.len()])
                .collect(),
        }
    }

    #[must_use]
    pub fn preset_weight(&self, preset: ExpressionPreset) -> f32 {
        self.presets.get(&preset).copied().unwrap_or(0.0)
    }

    /// Morph weights per mesh from the last evaluation.
    #[must_use]
    pub fn morph_weights(&self) -> &[Vec<f32>] {
        &self.morph_weights
    }

    /// Compute preset and morph weights for this tick. `now` is seconds.
    pub fn evaluate(&mut self, state: &mut AvatarState, now: f64) -> &[Vec<f32>] {
        self.presets.clear();

        let vowels = self.speech_weights(state, now);
        for (preset, weight) in ExpressionPreset::VOWELS.into_iter().zip(vowels) {
            self.presets.insert(preset, weight);
        }

        if let Some(emote) = state.emote {
            self.presets.insert(emote.preset(), 1.0);
        } else {
            let blink = blink_weight(now);
            if self.bindings.has(ExpressionPreset::Blink) {
                self.presets.insert(ExpressionPreset::Blink, blink);
            } else {
                self.presets.insert(ExpressionPreset::BlinkL, blink);
                self.presets.insert(ExpressionPreset::BlinkR, blink);
            }
        }

        for weights in &mut self.morph_weights {
            weights.fill(0.0);
        }
        for (&preset, &weight) in &self.presets {
            for bind in self.bindings.get(preset) {
                if let Some(slot) = self
                    .morph_weights
                    .get_mut(bind.mesh)
                    .and_then(|m| m.get_mut(bind.morph))
                {
                    *slot = (*slot + weight * bind.weight).min(1.0);
                }
            }
        }
        &self.morph_weights
    }

    fn speech_weights(&self, state: &mut AvatarState, now: f64) -> [f32; 5] {
        let speech = state.speech;
        if let Some(volume) = speech.volume {
            let volume = (volume * 10.0).min(1.0);
            return speech.vowels.map(|v| (v * volume).clamp(0.0, 1.0));
        }

        let target = if speech.fake { 1.0 } else { 0.0 };
        let smoothed = &mut state.smoothing.fake_speech;
        *smoothed = *smoothed * 0.99 + 0.01 * target;
        let amplitude = f64::from(*smoothed) / 1.5;
        let point = [now * 2.0, now * 2.0];
        self.noise
            .each_ref()
            .map(|n| (n.get(point) * amplitude).clamp(0.0, 1.0) as f32)
    }
}

/// Blink weight in a two second cycle: close over 100 ms, open over 100 ms.
#[must_use]
pub fn blink_weight(now: f64) -> f32 {
    let t = (now * 1000.0).rem_euclid(BLINK_PERIOD_MS);
    let weight = if t < BLINK_HALF_MS {
        t / BLINK_HALF_MS
    } else if t < BLINK_HALF_MS * 2.0 {
        1.0 - (t - BLINK_HALF_MS) / BLINK_HALF_MS
    } else {
        0.0
    };
    weight as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meshes() -> Vec<SkinnedMesh> {
        vec![SkinnedMesh {
            name: "Face".to_owned(),
            joints: vec![0],
            morph_targets: ["Fcl_MTH_A", "Fcl_MTH_I", "Fcl_EYE_Close", "Fcl_ALL_Joy", "Tongue"]
                .map(String::from)
                .to_vec(),
        }]
    }

    #[test]
    fn morph_names_bind_presets() {
        let bindings = ExpressionBindings::from_morph_names(&meshes());
        assert!(bindings.has(ExpressionPreset::A));
        assert!(bindings.has(ExpressionPreset::Blink));
        assert!(!bindings.has(ExpressionPreset::U));
        assert_eq!(ExpressionPreset::from_morph_name("Tongue"), None);
    }

    #[test]
    fn blink_ramps_up_then_down() {
        assert_eq!(blink_weight(0.0), 0.0);
        assert!((blink_weight(0.05) - 0.5).abs() < 1e-4);
        assert!((blink_weight(0.15) - 0.5).abs() < 1e-4);
        assert_eq!(blink_weight(0.5), 0.0);
        assert!((blink_weight(2.05) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn live_volume_scales_vowels() {
        let meshes = meshes();
        let mut layer = ExpressionLayer::new(ExpressionBindings::from_morph_names(&meshes), &meshes);
        let mut state = AvatarState::new();
        state.speech.volume = Some(0.05);
        state.speech.vowels = [1.0, 0.0, 0.4, 0.0, 0.0];
        let weights = layer.evaluate(&mut state, 0.5);
        assert!((weights[0][0] - 0.5).abs() < 1e-6);
        assert!((weights[0][1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn emote_suppresses_blink() {
        let meshes = meshes();
        let mut layer = ExpressionLayer::new(ExpressionBindings::from_morph_names(&meshes), &meshes);
        let mut state = AvatarState::new();
        state.emote = Some(Emote::Joy);
        let weights = layer.evaluate(&mut state, 0.05).to_vec();
        assert_eq!(weights[0][2], 0.0);
        assert_eq!(weights[0][3], 1.0);
    }

    #[test]
    fn fake_speech_stays_in_range_and_fades() {
        let meshes = meshes();
        let mut layer = ExpressionLayer::new(ExpressionBindings::from_morph_names(&meshes), &meshes);
        let mut state = AvatarState::new();
        state.speech.fake = true;
        for i in 0..300 {
            let weights = layer.evaluate(&mut state, f64::from(i) / 60.0);
            assert!(weights[0][0] >= 0.0 && weights[0][0] <= 1.0);
        }
        assert!(state.smoothing.fake_speech > 0.9);
        state.speech.fake = false;
        for i in 300..900 {
            layer.evaluate(&mut state, f64::from(i) / 60.0);
        }
        assert!(state.smoothing.fake_speech < 0.01);
    }
}
