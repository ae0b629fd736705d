// src/cli/mod.rs
// Thin CLI surface: one command, one of three modes.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "chatter-search", about = "Semantic search over chat workspace history")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the ingestion worker only, on its configured schedule.
    Ingestion,
    /// Run the request server and the ingestion worker together.
    Serve,
    /// Run a single search against the current index and print the result.
    SearchOnce {
        query: String,
        #[arg(long, env = "SEARCH_ONCE_TOP_K")]
        top_k: Option<u32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ingestion_subcommand() {
        let args = CliArgs::parse_from(["chatter-search", "ingestion"]);
        assert!(matches!(args.command, Command::Ingestion));
    }

    #[test]
    fn parses_serve_subcommand() {
        let args = CliArgs::parse_from(["chatter-search", "serve"]);
        assert!(matches!(args.command, Command::Serve));
    }

    #[test]
    fn parses_search_once_with_query() {
        let args = CliArgs::parse_from(["chatter-search", "search-once", "deploy failures"]);
        match args.command {
            Command::SearchOnce { query, top_k } => {
                assert_eq!(query, "deploy failures");
                assert!(top_k.is_none());
            }
            _ => panic!("expected SearchOnce"),
        }
    }

    #[test]
    fn parses_search_once_with_top_k_override() {
        let args = CliArgs::parse_from(["chatter-search", "search-once", "deploy failures", "--top-k", "5"]);
        match args.command {
            Command::SearchOnce { top_k, .. } => assert_eq!(top_k, Some(5)),
            _ => panic!("expected SearchOnce"),
        }
    }
}
