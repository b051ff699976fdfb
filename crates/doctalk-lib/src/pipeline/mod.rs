pub mod answer;
pub mod chunker;
pub mod ingest;
pub mod prompt;
