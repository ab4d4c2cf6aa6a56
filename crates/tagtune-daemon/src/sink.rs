use std::future::Future;

use tagtune_proto::error::PlaybackError;

/// The single audio output, exclusively owned by the playback controller.
pub trait AudioSink {
    /// Load `locator` (paused), or release the current source with `None`.
    fn set_source(
        &mut self,
        locator: Option<&str>,
    ) -> impl Future<Output = Result<(), PlaybackError>> + Send;

    fn play(&mut self) -> impl Future<Output = Result<(), PlaybackError>> + Send;

    fn pause(&mut self) -> impl Future<Output = Result<(), PlaybackError>> + Send;

    /// `volume` is in `[0, 1]`.
    fn set_volume(&mut self, volume: f32) -> impl Future<Output = Result<(), PlaybackError>> + Send;

    fn volume(&self) -> f32;

    fn is_paused(&self) -> bool;

    /// Player-assigned id of the loaded source, `None` when nothing is
    /// loaded or the player does not number its sources.
    fn source_id(&self) -> Option<u64>;
}
