use crate::config::Config;
use crate::extract;
use crate::server::sniff_mime;
use crate::vision::{self, VisionClient};
use anyhow::Context;
use std::path::Path;
use std::time::Instant;

// ── ANSI colors for terminal output ─────────────────────────────────────────

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// One-shot mode: identify a local photo and print the clean JSON, no
/// server involved.
pub async fn run_oneshot(config: &Config, photo: &Path) -> anyhow::Result<()> {
    let client = VisionClient::new(&config.vision);

    println!("\n{CYAN}{BOLD}🚗 carlens — One-Shot Mode{RESET}\n");
    println!("  {BOLD}Photo:{RESET} {}", photo.display());
    println!("  {BOLD}Model:{RESET} {}", config.vision.model);
    println!("  {DIM}Endpoint: {}{RESET}\n", config.vision.endpoint);

    let bytes = std::fs::read(photo)
        .with_context(|| format!("failed to read photo {}", photo.display()))?;
    let mime = sniff_mime(&bytes, None);
    let prompt = vision::load_prompt(Path::new(&config.vision.prompt_path))?;

    let start = Instant::now();
    let envelope = client.identify(&prompt, &bytes, &mime).await?;

    let clean = match extract::payload_from_response(&envelope) {
        Ok(clean) => clean,
        Err(e) => {
            eprintln!("{RED}✗ {}{RESET}", e);
            eprintln!("{DIM}full response: {}{RESET}", String::from_utf8_lossy(&envelope));
            anyhow::bail!("no JSON payload recovered from model output");
        }
    };

    println!("{GREEN}✓ identified in {:.1}s{RESET}\n", start.elapsed().as_secs_f32());
    println!("{}", String::from_utf8_lossy(&clean));
    Ok(())
}
