//! Audio stage command construction.

use std::path::Path;

use mclip_media::filters::{mix_with_external, volume_with_fades};
use mclip_media::FfmpegCommand;
use mclip_models::{AudioMode, AudioSettings, EncodingConfig, ModelError};

/// Facts about the clip entering the audio stage.
#[derive(Debug, Clone, Copy)]
pub struct ClipAudio {
    pub has_audio: bool,
    /// Probed video duration in seconds
    pub duration: f64,
}

/// Encoder command for the audio stage, or `None` when the clip passes
/// through untouched.
///
/// `mix` on a clip without an audio track becomes `replace`.
pub fn audio_command(
    settings: &AudioSettings,
    clip: &Path,
    clip_audio: ClipAudio,
    output: &Path,
    encoding: &EncodingConfig,
) -> Result<Option<FfmpegCommand>, ModelError> {
    let mode = effective_mode(settings.mode, clip_audio.has_audio);

    let command = match mode {
        AudioMode::Original => return Ok(None),
        AudioMode::Mute => FfmpegCommand::new(clip, output)
            .copy_video()
            .no_audio()
            .faststart(),
        AudioMode::Replace => {
            let external = external_path(settings)?;
            FfmpegCommand::new(clip, output)
                .input(external)
                .map("0:v:0")
                .map("1:a:0")
                .audio_filter(volume_with_fades(
                    settings.volume,
                    settings.fade_in,
                    settings.fade_out,
                    clip_audio.duration,
                ))
                .copy_video()
                .audio_encoding(encoding)
                .shortest()
                .faststart()
        }
        AudioMode::Mix => {
            let external = external_path(settings)?;
            let external_chain = volume_with_fades(
                settings.volume,
                settings.fade_in,
                settings.fade_out,
                clip_audio.duration,
            );
            FfmpegCommand::new(clip, output)
                .input(external)
                .filter_complex(mix_with_external(settings.original_volume, &external_chain))
                .map("0:v:0")
                .map("[aout]")
                .copy_video()
                .audio_encoding(encoding)
                .faststart()
        }
    };

    Ok(Some(command))
}

/// Mode actually applied to a clip.
pub fn effective_mode(mode: AudioMode, clip_has_audio: bool) -> AudioMode {
    match mode {
        AudioMode::Mix if !clip_has_audio => AudioMode::Replace,
        other => other,
    }
}

fn external_path(settings: &AudioSettings) -> Result<&Path, ModelError> {
    settings
        .external_path
        .as_deref()
        .ok_or(ModelError::MissingExternalAudio {
            mode: settings.mode,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WITH_AUDIO: ClipAudio = ClipAudio {
        has_audio: true,
        duration: 18.0,
    };

    fn args(settings: &AudioSettings, clip_audio: ClipAudio) -> Option<String> {
        audio_command(
            settings,
            Path::new("/arena/clip.mp4"),
            clip_audio,
            Path::new("/arena/audio.mp4"),
            &EncodingConfig::default(),
        )
        .unwrap()
        .map(|cmd| cmd.build_args().join(" "))
    }

    #[test]
    fn test_original_is_passthrough() {
        assert!(args(&AudioSettings::default(), WITH_AUDIO).is_none());
    }

    #[test]
    fn test_mute_copies_video_and_drops_audio() {
        let args = args(&AudioSettings::new(AudioMode::Mute), WITH_AUDIO).unwrap();
        assert!(args.contains("-c:v copy -an"));
    }

    #[test]
    fn test_replace_fades_against_video_duration() {
        let settings = AudioSettings::new(AudioMode::Replace)
            .with_external("/music/track.mp3")
            .with_fades(1.0, 2.0);
        let args = args(&settings, WITH_AUDIO).unwrap();
        assert!(args.contains("-i /arena/clip.mp4 -i /music/track.mp3 -map 0:v:0 -map 1:a:0"));
        assert!(args.contains("-af volume=1,afade=t=in:st=0:d=1.000,afade=t=out:st=16.000:d=2.000"));
        assert!(args.contains("-c:v copy -c:a aac -b:a 192k -shortest"));
    }

    #[test]
    fn test_mix_uses_first_duration() {
        let mut settings = AudioSettings::new(AudioMode::Mix).with_external("/music/bed.mp3");
        settings.volume = 0.3;
        settings.original_volume = 1.2;
        let args = args(&settings, WITH_AUDIO).unwrap();
        assert!(args.contains(
            "[0:a]volume=1.2[orig];[1:a]volume=0.3[ext];[orig][ext]amix=inputs=2:duration=first:dropout_transition=0[aout]"
        ));
        assert!(args.contains("-map 0:v:0 -map [aout]"));
        assert!(!args.contains("-shortest"));
    }

    #[test]
    fn test_mix_without_clip_audio_degrades_to_replace() {
        let settings = AudioSettings::new(AudioMode::Mix).with_external("/music/bed.mp3");
        let silent = ClipAudio {
            has_audio: false,
            duration: 18.0,
        };
        let args = args(&settings, silent).unwrap();
        assert!(args.contains("-map 1:a:0"));
        assert!(!args.contains("amix"));
        assert_eq!(effective_mode(AudioMode::Mix, false), AudioMode::Replace);
    }

    #[test]
    fn test_missing_external_is_audio_config_error() {
        let err = audio_command(
            &AudioSettings::new(AudioMode::Replace),
            Path::new("/arena/clip.mp4"),
            WITH_AUDIO,
            Path::new("/arena/audio.mp4"),
            &EncodingConfig::default(),
        )
        .unwrap_err();
        assert!(err.is_audio_config());
    }
}
