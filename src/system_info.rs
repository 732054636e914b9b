use crate::config::Config;
use crate::ffmpeg;
use serde::Serialize;
use sysinfo::System;
use tracing::warn;

#[derive(Serialize, Debug)]
pub struct SystemInfo {
    pub version: String,
    pub platform: String,
    pub arch: String,
    pub cpus: usize,
    pub cpu_model: String,
    pub memory_total_gb: f64,
    pub memory_free_gb: f64,
    pub ffmpeg: String,
}

pub async fn get_system_info(config: &Config) -> SystemInfo {
    let mut system = System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let ffmpeg_version = match ffmpeg::tool_version(&config.ffmpeg_bin).await {
        Ok(version) => version,
        Err(e) => {
            warn!(
                "{} not usable ({}). Server-side thumbnail generation will fail.",
                config.ffmpeg_bin, e
            );
            "not available".to_string()
        }
    };

    let cpu_model = system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    SystemInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        cpus: system.cpus().len(),
        cpu_model,
        memory_total_gb: system.total_memory() as f64 / 1024.0 / 1024.0 / 1024.0,
        memory_free_gb: system.available_memory() as f64 / 1024.0 / 1024.0 / 1024.0,
        ffmpeg: ffmpeg_version,
    }
}

pub async fn print_startup_info(config: &Config) {
    let sys_info = get_system_info(config).await;

    println!("{}", "=".repeat(60));
    println!("🚀 MiniTube Backend v{}", sys_info.version);
    println!("{}", "=".repeat(60));
    println!("📊 System Information:");
    println!("  Platform: {} ({})", sys_info.platform, sys_info.arch);
    println!("  CPUs: {} ({})", sys_info.cpus, sys_info.cpu_model);
    println!(
        "  Memory: {:.2} GB total, {:.2} GB available",
        sys_info.memory_total_gb, sys_info.memory_free_gb
    );
    println!("  FFmpeg: {}", sys_info.ffmpeg);
    println!("  Upload Dir: {:?}", config.upload_dir);
    println!("  Database: {:?}", config.db_file);
    println!(
        "  Thumbnails: frame at {:.1}s, {}px wide, {} concurrent, {:?} timeout",
        config.thumb_offset_seconds,
        config.thumb_width,
        config.max_concurrent_extractions,
        config.extraction_timeout
    );
    println!("  Max Upload: {} MB", config.max_file_size / 1024 / 1024);
    println!("{}", "=".repeat(60));
}
