//! Background swap example - replaces the backdrop behind a model photo.
//!
//! Run with: `cargo run --example change_background -- <photo.jpg> [keys.txt]`
//!
//! Keys are read one per line from the optional file, or `API_KEY` is used.

use lookbook::{AspectRatio, GeminiGateway, InputImage, Studio, StudioConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> lookbook::Result<()> {
    let mut args = std::env::args().skip(1);
    let input_path = args
        .next()
        .expect("Usage: change_background <photo.jpg> [keys.txt]");

    let config = StudioConfig::from_env()?;
    let studio = Studio::open(&config, Arc::new(GeminiGateway::default())).await;

    if let Some(keys_path) = args.next() {
        let raw = std::fs::read_to_string(keys_path)?;
        studio.credentials().persist(&raw).await?;
    }

    let photo = InputImage::from_path(&input_path)?;
    let image = studio
        .change_background(&photo, "Rooftop terrace at golden hour", AspectRatio::Portrait)
        .await?;

    image.save("background.png")?;
    println!(
        "Saved background.png ({} bytes); next key slot is #{}",
        image.size(),
        studio.credentials().current_index() + 1
    );

    Ok(())
}
