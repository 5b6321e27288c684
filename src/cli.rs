use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "barscope", about = "Audio-reactive bar graph over a looping GIF")]
pub struct Cli {
    /// 16-bit stereo PCM WAV file to play
    pub audio: PathBuf,

    /// GIF (or still image) drawn behind the bars
    pub overlay: PathBuf,
}
