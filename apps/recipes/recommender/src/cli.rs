use clap::{Parser, Subcommand};
use domain_recipes::DEFAULT_BATCH_SIZE;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "recipes-recommender")]
#[command(about = "Recommend recipes from the ingredients a user has")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Default, PartialEq, Subcommand)]
pub enum Command {
    /// Consume recommendation jobs and serve the HTTP endpoints (default)
    #[default]
    Worker,

    /// Load a JSON file of recipes into the vector index
    Index {
        /// Path to a JSON array of { id, title, ingredients, steps }
        #[arg(short, long)]
        file: PathBuf,

        /// Recipes embedded per model call
        #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Run one search and print the results as JSON
    Search {
        /// Comma-separated ingredient names
        #[arg(short, long)]
        query: String,
    },
}
