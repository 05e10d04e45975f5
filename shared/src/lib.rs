//! Building blocks of the music-appreciation backend: settings, the outbound
//! clients for OpenAI, Gemini, YouTube, Google Sheets and Google Forms, the
//! retry helper they share, and the mapper that turns response-sheet rows
//! into student records.

pub mod config;
pub mod dto;
pub mod error;
pub mod forms;
pub mod gemini_client;
pub mod llm;
pub mod openai_client;
pub mod prompt;
pub mod record_mapper;
pub mod retry;
pub mod sheets;
pub mod store;
pub mod upstream;
pub mod youtube;
