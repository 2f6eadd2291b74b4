pub mod encoder_error;
pub mod encoding_quality;
pub mod media_encoder;
