use serde::Serialize;
use serde_json::{Value, json};

use super::namespaces;
use crate::config::ClientConfig;

/// AudioPlayer activity as reported in `AudioPlayer.PlaybackState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerActivity {
    #[default]
    Idle,
    Playing,
    Paused,
    BufferUnderrun,
    Finished,
    Stopped,
}

/// Client state sent in the `context` array of every event.
///
/// This client does not implement the AudioPlayer interface, so playback state is
/// always the idle placeholder the service expects from speech-only devices.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceContext {
    pub playback_token: String,
    pub offset_in_milliseconds: u64,
    pub player_activity: PlayerActivity,
    pub volume: u8,
    pub muted: bool,
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self {
            playback_token: "audio_token".to_string(),
            offset_in_milliseconds: 0,
            player_activity: PlayerActivity::Idle,
            volume: 50,
            muted: false,
        }
    }
}

impl DeviceContext {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            volume: config.speaker_volume,
            muted: config.speaker_muted,
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> Value {
        json!([
            {
                "header": {
                    "namespace": namespaces::AUDIO_PLAYER,
                    "name": "PlaybackState"
                },
                "payload": {
                    "token": self.playback_token,
                    "offsetInMilliseconds": self.offset_in_milliseconds,
                    "playerActivity": self.player_activity
                }
            },
            {
                "header": {
                    "namespace": namespaces::SPEAKER,
                    "name": "VolumeState"
                },
                "payload": {
                    "volume": self.volume,
                    "muted": self.muted
                }
            }
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context_shape() {
        let context = DeviceContext::default().to_json();
        let entries = context.as_array().unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0]["header"]["namespace"], "AudioPlayer");
        assert_eq!(entries[0]["header"]["name"], "PlaybackState");
        assert_eq!(entries[0]["payload"]["playerActivity"], "IDLE");
        assert_eq!(entries[0]["payload"]["offsetInMilliseconds"], 0);

        assert_eq!(entries[1]["header"]["namespace"], "Speaker");
        assert_eq!(entries[1]["payload"]["volume"], 50);
        assert_eq!(entries[1]["payload"]["muted"], false);
    }

    #[test]
    fn test_context_from_config() {
        let mut config = ClientConfig::new("id", "secret", "refresh");
        config.speaker_volume = 80;
        config.speaker_muted = true;

        let context = DeviceContext::from_config(&config).to_json();
        assert_eq!(context[1]["payload"]["volume"], 80);
        assert_eq!(context[1]["payload"]["muted"], true);
    }

    #[test]
    fn test_buffer_underrun_wire_name() {
        assert_eq!(
            serde_json::to_value(PlayerActivity::BufferUnderrun).unwrap(),
            "BUFFER_UNDERRUN"
        );
    }
}
