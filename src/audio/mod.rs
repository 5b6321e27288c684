pub mod decode;
pub mod fft;
pub mod sink;
pub mod spectrum;
#[cfg(feature = "playback")]
pub mod cpal_sink;
