pub mod mock;

#[cfg(feature = "openai")]
pub mod openai;
