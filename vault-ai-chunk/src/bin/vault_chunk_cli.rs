use clap::Parser;
use std::fs;
use std::io::{self, Read};
use vault_ai_chunk::{ChunkerConfig, MarkdownChunker};

/// A CLI tool to chunk markdown notes into JSON output using vault-ai-chunk.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input note file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Maximum size for each chunk, in bytes.
    #[arg(long, default_value_t = 2000)]
    max_chunk_chars: usize,

    /// Sections shorter than this are merged with adjacent siblings.
    #[arg(long, default_value_t = 128)]
    min_chunk_chars: usize,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let note_text = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let chunker = MarkdownChunker::new(ChunkerConfig::new(
        args.max_chunk_chars,
        args.min_chunk_chars,
    ));
    let chunks = chunker.chunk(&note_text);

    let json_output = serde_json::to_string_pretty(&chunks)?;
    println!("{}", json_output);

    Ok(())
}
