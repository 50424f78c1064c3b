pub mod analyzer;
pub mod bands;
pub mod beat;
pub mod capture;
pub mod decode;
pub mod playback;
pub mod source;
