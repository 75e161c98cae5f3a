//! Bakes a small material atlas from an in-memory layout
//!
//! Resolves a handful of rules against a two-page layout, prints the cache key
//! and a row of each page, rebuilds the same page as tiles on the worker pool,
//! and uploads to a real device when one is available.

use hearth_material_atlas::{
    AssetKey, AtlasLayout, AtlasSnapshot, AtlasTextureStore, MaterialAtlasBuilder, MaterialAtlasConfig, MaterialDefinition,
    MaterialRule, NoOverrides, PageGeometry, TileScheduler, UvRect, WgpuTextureProvider,
};
use std::sync::Arc;
use std::time::Duration;

fn key(reference: &str) -> AssetKey {
    AssetKey::parse(reference).expect("valid texture reference")
}

fn main() {
    // Initialize logging
    env_logger::init();

    println!("Material Atlas Bake Example");
    println!("===========================");

    let config = MaterialAtlasConfig::from_toml_str("worker_threads = 2\nenable_normal_depth = false\n")
        .expect("Failed to parse config");

    let rules = vec![
        MaterialRule::material(
            key("pbr:rules/metals"),
            "block/*_block",
            MaterialDefinition::new(0.3, 1.0, 0.0).with_priority(1),
        ),
        MaterialRule::material(
            key("pbr:rules/glow"),
            "block/glowstone",
            MaterialDefinition::new(0.9, 0.0, 1.0).with_priority(5),
        ),
        MaterialRule::material(
            key("pbr:rules/stone"),
            "minecraft:block/**",
            MaterialDefinition::new(0.95, 0.0, 0.0),
        ),
    ];

    let layout = AtlasLayout::new(vec![
        PageGeometry::new(1, 16, 16),
        PageGeometry::new(2, 8, 8),
        PageGeometry::new(0, 0, 0),
    ])
    .with_texture(key("textures/block/iron_block.png"), 1, UvRect::new(0.0, 0.0, 0.5, 0.5))
    .with_texture(key("block/glowstone"), 1, UvRect::new(0.5, 0.0, 1.0, 0.5))
    .with_texture(key("block/cobblestone"), 1, UvRect::new(0.0, 0.5, 0.5, 1.0))
    .with_texture(key("block/gold_block"), 2, UvRect::new(0.0, 0.0, 1.0, 1.0));

    let mut builder = MaterialAtlasBuilder::new(config, rules).expect("Failed to compile rules");
    let build = builder
        .build(&layout, &NoOverrides)
        .expect("Build failed")
        .expect("First build always runs");

    println!("\nCache key: {}", build.cache_key);
    for (id, buffer) in &build.buffers.buffers {
        let row: Vec<String> = (0..buffer.width())
            .step_by(4)
            .filter_map(|x| buffer.pixel(x, 0))
            .map(|p| format!("({:.2},{:.2},{:.2})", p[0], p[1], p[2]))
            .collect();
        println!("Page {} ({}x{}): {}", id, buffer.width(), buffer.height(), row.join(" "));
    }

    match builder.build(&layout, &NoOverrides).expect("Build failed") {
        Some(_) => println!("\nUnexpected rebuild with unchanged inputs"),
        None => println!("\nSecond build skipped, inputs unchanged"),
    }

    // Incremental path: the same page baked as tiles on the worker pool
    let mut scheduler =
        TileScheduler::new(builder.config().worker_threads).expect("Failed to start tile workers");
    let jobs = builder
        .bake_tile_jobs(&layout, &NoOverrides, 8)
        .expect("Failed to plan tiles");
    let count = jobs.len();
    for job in jobs {
        scheduler.submit(job).expect("Failed to submit tile");
    }
    let tiles = scheduler.wait_results(count, Duration::from_secs(5));
    let matching = tiles
        .iter()
        .filter(|tile| {
            build.buffers.buffers.get(&tile.page_id).and_then(|b| b.extract_rect(&tile.rect).ok())
                == Some(tile.data.clone())
        })
        .count();
    println!("Tiles baked: {}/{} match the full build", matching, count);
    scheduler
        .gate_mut()
        .retain_pages(layout.active_pages().iter().map(|page| page.atlas_texture_id));

    // Upload when a GPU is around
    let instance = wgpu::Instance::default();
    let Some(adapter) = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default())) else {
        println!("\nNo GPU adapter, skipping upload");
        return;
    };
    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("Material Atlas Example Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
        },
        None,
    ))
    .expect("Failed to create device");

    let provider = WgpuTextureProvider::new(Arc::new(device), Arc::new(queue));
    let mut store = AtlasTextureStore::new(provider);
    let report = builder.apply_to_store(&build, &mut store).expect("Upload failed");
    println!("\nGPU pages: {:?} ({:?})", store.page_ids(), report);
}
