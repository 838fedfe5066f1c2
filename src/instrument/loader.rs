//! Background sample decoding.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crate::audio_engine::sample_loader::decode_audio_file;
use crate::instrument::{Command, CommandSender};

/// Where a decoded sample ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTarget {
    Pad(usize),
    Library,
}

/// Decodes `path` on a worker thread and posts the result back as
/// [`Command::SampleDecoded`].
pub fn spawn_decode(path: PathBuf, target: LoadTarget, sender: CommandSender) -> JoinHandle<()> {
    thread::spawn(move || {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        log::debug!("Decoding {} for {:?}", path.display(), target);
        let result = decode_audio_file(&path);

        if !sender.send(Command::SampleDecoded {
            target,
            name,
            result,
        }) {
            log::debug!("Instrument gone, dropping decoded {}", path.display());
        }
    })
}
