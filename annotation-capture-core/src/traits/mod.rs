pub mod audio_writer;
pub mod capture_delegate;
pub mod capture_provider;
pub mod capture_session;
