//! Caption decoding example
//!
//! Feeds a caption management packet and two caption statements through a
//! feeder, wrapped in ID3 tags the way HLS timed metadata carries them, and
//! prints what a renderer would be asked to draw.
//!
//! Run with: cargo run -p aribcap-core --example captions

use anyhow::Result;
use bytes::Bytes;

use aribcap_core::transport::write_synchsafe;
use aribcap_core::{
    CaptionFeeder, CaptionPlaneState, Directive, Feeder, FeederConfig, Glyph, Renderer,
};

/// Renderer that prints placements instead of drawing them
struct TextRenderer {
    width: u32,
    height: u32,
}

impl Renderer for TextRenderer {
    fn render(&mut self, initial_state: &CaptionPlaneState, directives: &[Directive]) {
        let (plane_width, plane_height) = initial_state.plane;
        let sx = f64::from(self.width) / plane_width;
        let sy = f64::from(self.height) / plane_height;

        for directive in directives {
            match directive {
                Directive::Glyph(placement) => {
                    let text = match &placement.glyph {
                        Glyph::Char(c) => c.to_string(),
                        Glyph::Drcs { drcs, .. } => format!("<drcs {:?}>", drcs),
                        Glyph::Fill => "<fill>".to_string(),
                    };
                    println!(
                        "  {:<8} at ({:>6.1}, {:>6.1}) size {:>5.1}x{:<5.1} fg={} bg={}",
                        text,
                        placement.rect.x * sx,
                        placement.rect.y * sy,
                        placement.rect.width * sx,
                        placement.rect.height * sy,
                        placement.colors.foreground,
                        placement.colors.background,
                    );
                }
                Directive::ClearScreen { time } => println!("  -- clear screen at +{:.1}s", time),
            }
        }
    }

    fn clear(&mut self) {
        println!("  (cleared)");
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
}

fn data_units(units: &[(u8, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (parameter, payload) in units {
        body.extend_from_slice(&[0x1F, *parameter]);
        body.extend_from_slice(&(payload.len() as u32).to_be_bytes()[1..]);
        body.extend_from_slice(payload);
    }
    let mut out = (body.len() as u32).to_be_bytes()[1..].to_vec();
    out.extend_from_slice(&body);
    out
}

fn pes(group_id: u8, group_data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x80, 0xFF, 0xF0, group_id << 2, 0x00, 0x00];
    out.extend_from_slice(&(group_data.len() as u16).to_be_bytes());
    out.extend_from_slice(group_data);
    out.extend_from_slice(&[0x00, 0x00]);
    out
}

fn management() -> Vec<u8> {
    let mut group = vec![0x00, 0x01, 0x00];
    group.extend_from_slice(b"jpn");
    group.push(0x70);
    group.extend_from_slice(&data_units(&[]));
    pes(0x00, &group)
}

fn statement(body: &[u8]) -> Vec<u8> {
    let mut group = vec![0x00];
    group.extend_from_slice(&data_units(&[(0x20, body)]));
    pes(0x01, &group)
}

fn id3(payload: &[u8]) -> Bytes {
    let mut frame = b"aribb24.js\0".to_vec();
    frame.extend_from_slice(payload);

    let mut body = b"PRIV".to_vec();
    body.extend_from_slice(&write_synchsafe(frame.len() as u32));
    body.extend_from_slice(&[0, 0]);
    body.extend_from_slice(&frame);

    let mut tag = b"ID3\x04\x00\x00".to_vec();
    tag.extend_from_slice(&write_synchsafe(body.len() as u32));
    tag.extend_from_slice(&body);
    Bytes::from(tag)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    aribcap_core::init();

    println!("Aribcap Core - Caption Decoding Example");
    println!("==========================================\n");

    let feeder = CaptionFeeder::new(FeederConfig::default())?;
    let mut renderer = TextRenderer { width: 1920, height: 1080 };

    // CS, yellow, "こんにちは", wait 2s, then a double height line in white
    let first: &[u8] = &[
        0x0C, 0x83, 0xB3, 0xF3, 0xCB, 0xC1, 0xCF, 0x9D, 0x20, 0x54,
    ];
    let second: &[u8] = &[
        0x0C, 0x1C, 0x45, 0x41, 0x87, 0x8B, 0x41, 0xD0, 0xA4, 0xD0, 0xA4,
    ];

    feeder.feed_id3(&id3(&management()), 0.0).await;
    feeder.feed_id3(&id3(&statement(first)), 1.0).await;
    feeder.feed_id3(&id3(&statement(second)), 3.0).await;

    feeder.on_attach().await;

    let mut shown = None;
    for tick in 0..=10 {
        let time = f64::from(tick) * 0.5;
        feeder.content(time).await;
        feeder.flush().await?;

        let current = feeder.content(time).await;
        let pts = current.as_ref().map(|segment| segment.pts);
        if pts == shown {
            continue;
        }
        shown = pts;

        println!("t={:.1}s", time);
        match current {
            Some(segment) => {
                println!("  segment pts={:.1}s duration={:.1}s", segment.pts, segment.duration);
                renderer.render(&segment.initial_state, &segment.directives);
            }
            None => renderer.clear(),
        }
    }

    println!("\nSeeking back to the start...");
    feeder.on_seeking().await;
    renderer.on_seeking();
    println!("  caption at 4.0s after seek: {:?}", feeder.content(4.0).await.map(|s| s.pts));

    feeder.destroy().await;
    Ok(())
}
