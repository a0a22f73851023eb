pub mod dump;
pub mod read;
pub mod readers;
pub mod watch;

use std::path::{Path, PathBuf};

use egk_card::{
    BuiltinProfiles, CardReader, EgkSession, PcscChannel, PcscError, ProfileError, ProfileFile, ProfileSource,
    ProfileTable, SessionOptions, SessionReport,
};

use crate::formatters::FormatMode;

/// Settings shared by the card reading commands
pub struct ReadOptions {
    pub reader: Option<String>,
    pub profiles: Option<PathBuf>,
    pub format: FormatMode,
    pub session: SessionOptions,
}

/// Load profiles from the given file or the built-in set
pub(crate) fn load_profiles(path: Option<&Path>) -> Result<ProfileTable, ProfileError> {
    match path {
        Some(path) => ProfileFile(path.to_path_buf()).load_profiles(),
        None => BuiltinProfiles.load_profiles(),
    }
}

/// Channel to the named reader, or the first one
pub(crate) fn open_channel(reader: &CardReader, name: Option<&str>) -> Result<PcscChannel, PcscError> {
    match name {
        Some(name) => reader.channel(name),
        None => reader.first_channel(),
    }
}

/// Run one read session, printing setup failures
pub(crate) fn run_session(options: &ReadOptions) -> Option<SessionReport> {
    let profiles = match load_profiles(options.profiles.as_deref()) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("Failed to load card profiles: {}", err);
            return None;
        }
    };

    let reader = match CardReader::new() {
        Ok(r) => r,
        Err(err) => {
            eprintln!("Failed to establish PC/SC context: {}", err);
            return None;
        }
    };

    let channel = match open_channel(&reader, options.reader.as_deref()) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("Failed to open reader: {}", err);
            eprintln!("Use `egk readers` to list the available readers");
            return None;
        }
    };

    if options.format != FormatMode::Json {
        println!("Reader: {}\n", channel.reader_name());
    }

    Some(EgkSession::new(channel, &profiles, options.session).run(&mut ()))
}
