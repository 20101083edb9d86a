//! Pose variations example - several poses generated in parallel, kept in the gallery.
//!
//! Run with: `cargo run --example pose_variations -- <photo.jpg>`

use lookbook::{AspectRatio, GeminiGateway, InputImage, Studio, StudioConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> lookbook::Result<()> {
    let input_path = std::env::args()
        .nth(1)
        .expect("Usage: pose_variations <photo.jpg>");

    let config = StudioConfig::builder().concurrency(2).build()?;
    let studio = Studio::open(&config, Arc::new(GeminiGateway::default())).await;

    let ideas = studio.pose_suggestions().await?;
    println!("Pose ideas: {}", ideas.join(", "));

    let hint = ideas.first().cloned().unwrap_or_default();
    let photo = InputImage::from_path(&input_path)?;
    let images = studio
        .transfer_pose(&photo, &hint, 3, AspectRatio::Story)
        .await?;

    for (i, image) in images.iter().enumerate() {
        let path = format!("pose-{}.png", i + 1);
        image.save(&path)?;
        studio.keep(image).await?;
        println!("Saved {path} ({} bytes)", image.size());
    }
    println!("Gallery now holds {} result(s)", studio.gallery().len().await);

    Ok(())
}
