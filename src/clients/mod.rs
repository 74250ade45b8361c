pub mod google_tts;
pub mod openai;
