//! Paired noisy/clean speech corpus builder and reader.
/// Audio decoding, resampling, and mono preparation.
pub mod audio;
/// Pipeline configuration shared by writer and reader.
pub mod config;
/// Corpus building, record serialization, and streaming reads.
pub mod corpus;
/// FFT/STFT primitives.
pub mod dsp;
/// Logging setup.
pub mod logging;
