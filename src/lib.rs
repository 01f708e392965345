//! Lectern - grounded question answering over textbooks
//!
//! Answers questions against indexed textbook fragments by combining exact
//! keyword matching with semantic similarity, then synthesizes an answer whose
//! citations are checked against the fragments the model actually saw.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod entities;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod retrieval;
pub mod storage;
pub mod synthesis;
pub mod text;

pub use error::{LecternError, Result};
