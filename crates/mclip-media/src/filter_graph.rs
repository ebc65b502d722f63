//! Filter-graph compiler for multi-source composites.
//!
//! Turns a canvas plus z-ordered (source, slot) pairs into one
//! `-filter_complex` expression. Input `i` in the graph is the `i`-th `-i`
//! of the command, so callers must add inputs in the same order.
//!
//! Graph shape:
//! ```text
//! color=...[bg]
//! [0:v]crop,scale,...,format=yuva420p[v0]
//! [1:v]...[v1]
//! [bg][v0]overlay=...[ov0]
//! [ov0][v1]overlay=...[vout]
//! [0:a]volume=...[a0];[1:a]volume=...[a1];[a0][a1]amix=...[aout]
//! ```

use mclip_models::{AudioPolicy, Canvas, ScaleMode, Slot, VideoSource};

/// Background duration in seconds; the real length is set by `-t` on the output.
pub const BACKGROUND_SENTINEL_SECS: u32 = 86_400;

pub const VIDEO_OUT_LABEL: &str = "vout";
pub const AUDIO_OUT_LABEL: &str = "aout";

/// One graph input: a source, the slot it draws into, and probe facts.
#[derive(Debug, Clone, Copy)]
pub struct CompositeInput<'a> {
    pub source: &'a VideoSource,
    pub slot: &'a Slot,
    /// Whether the file actually carries an audio stream
    pub has_audio: bool,
    /// Probed width and height of the file, used when the source region
    /// does not declare its own.
    pub probed_size: Option<(u32, u32)>,
}

impl<'a> CompositeInput<'a> {
    pub fn new(source: &'a VideoSource, slot: &'a Slot) -> Self {
        Self {
            source,
            slot,
            has_audio: true,
            probed_size: None,
        }
    }

    pub fn with_audio(mut self, has_audio: bool) -> Self {
        self.has_audio = has_audio;
        self
    }

    pub fn with_probed_size(mut self, width: u32, height: u32) -> Self {
        self.probed_size = Some((width, height));
        self
    }

    /// Size of the frames entering the scaler.
    fn scaler_input_size(&self) -> Option<(u32, u32)> {
        self.source
            .region
            .aspect_dimensions()
            .or(self.probed_size)
            .filter(|(w, h)| *w > 0 && *h > 0)
    }

    fn contributes_audio(&self) -> bool {
        self.source.audio_enabled && self.has_audio
    }
}

/// A compiled graph and its terminal labels.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    pub expression: String,
    pub video_label: String,
    pub audio_label: Option<String>,
}

impl FilterGraph {
    /// `-map` argument for the video output.
    pub fn video_map(&self) -> String {
        format!("[{}]", self.video_label)
    }

    /// `-map` argument for the audio output, if any.
    pub fn audio_map(&self) -> Option<String> {
        self.audio_label.as_ref().map(|label| format!("[{}]", label))
    }
}

/// Builds one [`FilterGraph`]; consumed by [`FilterGraphBuilder::build`].
#[derive(Debug)]
pub struct FilterGraphBuilder<'a> {
    canvas: &'a Canvas,
    inputs: Vec<CompositeInput<'a>>,
    audio_policy: AudioPolicy,
    preferred_audio: Option<&'a str>,
    label_counter: usize,
}

impl<'a> FilterGraphBuilder<'a> {
    pub fn new(canvas: &'a Canvas) -> Self {
        Self {
            canvas,
            inputs: Vec::new(),
            audio_policy: AudioPolicy::default(),
            preferred_audio: None,
            label_counter: 0,
        }
    }

    /// Append an input; call in z-order, bottom layer first.
    pub fn input(mut self, input: CompositeInput<'a>) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn inputs(mut self, inputs: impl IntoIterator<Item = CompositeInput<'a>>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    /// Audio policy, plus the source id preferred for single-source output.
    pub fn audio(mut self, policy: AudioPolicy, preferred: Option<&'a str>) -> Self {
        self.audio_policy = policy;
        self.preferred_audio = preferred;
        self
    }

    fn next_label(&mut self, prefix: &str) -> String {
        let label = format!("{}{}", prefix, self.label_counter);
        self.label_counter += 1;
        label
    }

    pub fn build(mut self) -> FilterGraph {
        let mut chains = Vec::with_capacity(self.inputs.len() * 2 + 2);

        chains.push(format!(
            "color=c={}:s={}x{}:r={}:d={}[bg]",
            self.canvas.background,
            self.canvas.width,
            self.canvas.height,
            self.canvas.fps,
            BACKGROUND_SENTINEL_SECS
        ));

        let inputs = std::mem::take(&mut self.inputs);

        let mut layer_labels = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let label = self.next_label("v");
            chains.push(format!(
                "[{}:v]{}[{}]",
                index,
                input_chain(input, self.canvas.fps),
                label
            ));
            layer_labels.push(label);
        }

        if inputs.is_empty() {
            chains.push(format!("[bg]null[{}]", VIDEO_OUT_LABEL));
        } else {
            let mut base = "bg".to_string();
            let last = inputs.len() - 1;
            for (i, (input, layer)) in inputs.iter().zip(&layer_labels).enumerate() {
                let out = if i == last {
                    VIDEO_OUT_LABEL.to_string()
                } else {
                    self.next_label("ov")
                };
                chains.push(format!(
                    "[{}][{}]overlay=x={}:y={}:eof_action=pass:format=auto[{}]",
                    base, layer, input.slot.x, input.slot.y, out
                ));
                base = out;
            }
        }

        let audio_label = self.audio_chain(&inputs, &mut chains);

        FilterGraph {
            expression: chains.join(";"),
            video_label: VIDEO_OUT_LABEL.to_string(),
            audio_label,
        }
    }

    fn audio_chain(&mut self, inputs: &[CompositeInput<'a>], chains: &mut Vec<String>) -> Option<String> {
        match self.audio_policy {
            AudioPolicy::Mute => None,
            AudioPolicy::SingleSource => {
                let (index, input) = self
                    .preferred_audio
                    .and_then(|id| {
                        inputs
                            .iter()
                            .enumerate()
                            .find(|(_, input)| input.contributes_audio() && input.source.id == id)
                    })
                    .or_else(|| {
                        inputs
                            .iter()
                            .enumerate()
                            .find(|(_, input)| input.contributes_audio())
                    })?;
                chains.push(format!(
                    "[{}:a]volume={}[{}]",
                    index, input.source.volume, AUDIO_OUT_LABEL
                ));
                Some(AUDIO_OUT_LABEL.to_string())
            }
            AudioPolicy::MixAll => {
                let contributing: Vec<(usize, &CompositeInput<'_>)> = inputs
                    .iter()
                    .enumerate()
                    .filter(|(_, input)| input.contributes_audio())
                    .collect();

                if contributing.is_empty() {
                    return None;
                }

                // amix even for a single input
                let mut mix_inputs = String::new();
                for (index, input) in &contributing {
                    let label = self.next_label("a");
                    chains.push(format!(
                        "[{}:a]volume={}[{}]",
                        index, input.source.volume, label
                    ));
                    mix_inputs.push_str(&format!("[{}]", label));
                }
                chains.push(format!(
                    "{}amix=inputs={}:duration=longest:dropout_transition=0[{}]",
                    mix_inputs,
                    contributing.len(),
                    AUDIO_OUT_LABEL
                ));
                Some(AUDIO_OUT_LABEL.to_string())
            }
        }
    }
}

/// Per-input filter chain, without labels.
fn input_chain(input: &CompositeInput<'_>, fps: f64) -> String {
    let mut filters = Vec::new();

    if let Some(crop) = &input.source.region.crop {
        filters.push(format!(
            "crop={}:{}:{}:{}",
            crop.width, crop.height, crop.x, crop.y
        ));
    }

    filters.extend(scale_filters(
        input.slot.scale_mode,
        input.scaler_input_size(),
        input.slot.width,
        input.slot.height,
    ));

    filters.push("setsar=1".to_string());
    filters.push(format!("fps={}", fps));
    filters.push("format=yuva420p".to_string());

    if input.slot.opacity < 1.0 {
        filters.push(format!("colorchannelmixer=aa={}", input.slot.opacity));
    }

    filters.join(",")
}

/// Scale (and pad or crop) filters fitting a source into a `width`x`height` slot.
pub fn scale_filters(
    mode: ScaleMode,
    source_size: Option<(u32, u32)>,
    width: u32,
    height: u32,
) -> Vec<String> {
    match mode {
        ScaleMode::None => Vec::new(),
        ScaleMode::Stretch => vec![format!("scale={}:{}", width, height)],
        ScaleMode::Fit => vec![
            format!(
                "scale={}:{}:force_original_aspect_ratio=decrease",
                width, height
            ),
            format!("pad={}:{}:(ow-iw)/2:(oh-ih)/2", width, height),
        ],
        ScaleMode::Fill => match source_size {
            Some((src_w, src_h)) => {
                let (scaled_w, scaled_h) = fill_dimensions(src_w, src_h, width, height);
                vec![
                    format!("scale={}:{}", scaled_w, scaled_h),
                    format!("crop={}:{}", width, height),
                ]
            }
            None => vec![
                format!(
                    "scale={}:{}:force_original_aspect_ratio=increase",
                    width, height
                ),
                format!("crop={}:{}", width, height),
            ],
        },
    }
}

/// Scaled size that covers the slot with the overflow on one axis only.
///
/// A source at least as wide as the slot (by aspect) is scaled to the slot
/// height; a narrower one to the slot width. The free dimension is rounded
/// up to an even number so the following crop never exceeds the frame.
pub fn fill_dimensions(src_w: u32, src_h: u32, slot_w: u32, slot_h: u32) -> (u32, u32) {
    let src_wider = u64::from(src_w) * u64::from(slot_h) >= u64::from(slot_w) * u64::from(src_h);
    if src_wider {
        let scaled = ceil_div(u64::from(src_w) * u64::from(slot_h), u64::from(src_h));
        (round_up_even(scaled).max(u64::from(slot_w)) as u32, slot_h)
    } else {
        let scaled = ceil_div(u64::from(src_h) * u64::from(slot_w), u64::from(src_w));
        (slot_w, round_up_even(scaled).max(u64::from(slot_h)) as u32)
    }
}

fn ceil_div(num: u64, den: u64) -> u64 {
    num.div_ceil(den.max(1))
}

fn round_up_even(value: u64) -> u64 {
    value + (value % 2)
}
