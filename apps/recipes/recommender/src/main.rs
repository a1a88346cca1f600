//! Recipe Recommender - Entry Point

#[tokio::main]
async fn main() -> eyre::Result<()> {
    recipes_recommender::run().await
}
