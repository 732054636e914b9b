use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub upload_dir: String,
    pub db_file: String,
    pub max_upload_mb: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            upload_dir: "uploads".to_string(),
            db_file: "mini_yt.sqlite".to_string(),
            max_upload_mb: 500,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub offset_seconds: f64,
    pub width: u32,
    pub extraction_timeout_seconds: u64,
    pub max_concurrent_extractions: Option<usize>, // None = auto-detect
    pub ffmpeg_bin: String,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            offset_seconds: 1.0,
            width: 640,
            extraction_timeout_seconds: 30,
            max_concurrent_extractions: None,
            ffmpeg_bin: "ffmpeg".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev_secret_change_me".to_string(),
            bcrypt_cost: 10,
        }
    }
}

/// Layout of `config.toml`. Every section and field is optional.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub server: ServerConfig,
    pub thumbnails: ThumbnailConfig,
    pub auth: AuthConfig,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub upload_dir: PathBuf,
    pub db_file: PathBuf,
    pub max_file_size: u64,
    pub thumb_offset_seconds: f64,
    pub thumb_width: u32,
    pub extraction_timeout: Duration,
    pub max_concurrent_extractions: usize,
    pub ffmpeg_bin: String,
    pub jwt_secret: String,
    pub bcrypt_cost: u32,
}

fn default_concurrent_extractions() -> usize {
    let cpu_count = num_cpus::get();
    cpu_count.saturating_sub(1).clamp(2, 8)
}

fn resolve_path(base_dir: &Path, value: String) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

fn base_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn read_config_file(base_dir: &Path) -> anyhow::Result<ConfigFile> {
    let config_path = base_dir.join("config.toml");
    if !config_path.exists() {
        return Ok(ConfigFile::default());
    }
    let content = std::fs::read_to_string(&config_path)?;
    Ok(toml::from_str::<ConfigFile>(&content)?)
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let base_dir = base_dir();
        let file = read_config_file(&base_dir)?;
        Ok(Self::resolve(&base_dir, file, |key| std::env::var(key).ok()))
    }

    /// Like [`Config::load`], but a broken `config.toml` only costs the file
    /// values; environment overrides still apply.
    pub fn from_env() -> Self {
        let base_dir = base_dir();
        let file = read_config_file(&base_dir).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config.toml: {}. Using defaults.", e);
            ConfigFile::default()
        });
        Self::resolve(&base_dir, file, |key| std::env::var(key).ok())
    }

    /// Apply overrides from `env` on top of the file values.
    fn resolve(
        base_dir: &Path,
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        fn parsed<T: std::str::FromStr>(
            env: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            env(key).and_then(|v| v.parse().ok())
        }

        let ConfigFile {
            server,
            thumbnails,
            auth,
        } = file;

        let max_upload_mb: u64 = parsed(&env, "MAX_UPLOAD_MB").unwrap_or(server.max_upload_mb);

        let thumb_offset_seconds = parsed(&env, "THUMB_TIME_SECONDS")
            .unwrap_or(thumbnails.offset_seconds);
        let thumb_offset_seconds = if thumb_offset_seconds.is_finite() && thumb_offset_seconds >= 0.0 {
            thumb_offset_seconds
        } else {
            1.0
        };

        let thumb_width = Some(parsed(&env, "THUMB_WIDTH").unwrap_or(thumbnails.width))
            .filter(|&w| w > 0)
            .unwrap_or(640);

        let extraction_timeout_seconds = Some(
            parsed(&env, "EXTRACTION_TIMEOUT_SECONDS")
                .unwrap_or(thumbnails.extraction_timeout_seconds),
        )
        .filter(|&s| s > 0)
        .unwrap_or(30);

        let max_concurrent_extractions = parsed(&env, "MAX_CONCURRENT_EXTRACTIONS")
            .or(thumbnails.max_concurrent_extractions)
            .filter(|&v| v > 0)
            .unwrap_or_else(default_concurrent_extractions);

        let bcrypt_cost = Some(parsed(&env, "BCRYPT_COST").unwrap_or(auth.bcrypt_cost))
            .filter(|c| (4..=31).contains(c))
            .unwrap_or(10);

        Self {
            port: parsed(&env, "PORT").unwrap_or(server.port),
            upload_dir: resolve_path(base_dir, env("UPLOAD_DIR").unwrap_or(server.upload_dir)),
            db_file: resolve_path(base_dir, env("DB_FILE").unwrap_or(server.db_file)),
            max_file_size: max_upload_mb.saturating_mul(1024 * 1024),
            thumb_offset_seconds,
            thumb_width,
            extraction_timeout: Duration::from_secs(extraction_timeout_seconds),
            max_concurrent_extractions,
            ffmpeg_bin: env("FFMPEG_BIN").unwrap_or(thumbnails.ffmpeg_bin),
            jwt_secret: env("JWT_SECRET").unwrap_or(auth.jwt_secret),
            bcrypt_cost,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve(&base_dir(), ConfigFile::default(), |_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            [server]
            port = 8080
            upload_dir = "/srv/videos"
            db_file = "videos.sqlite"
            max_upload_mb = 64

            [thumbnails]
            offset_seconds = 2.5
            width = 320
            extraction_timeout_seconds = 10
            ffmpeg_bin = "/usr/bin/ffmpeg"

            [auth]
            jwt_secret = "s3cret"
            "#,
        )
        .unwrap();

        assert_eq!(file.server.port, 8080);
        assert_eq!(file.thumbnails.width, 320);
        assert_eq!(file.thumbnails.max_concurrent_extractions, None);
        assert_eq!(file.auth.jwt_secret, "s3cret");
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/opt/app");
        assert_eq!(
            resolve_path(base, "uploads".to_string()),
            PathBuf::from("/opt/app/uploads")
        );
        assert_eq!(
            resolve_path(base, "/data/uploads".to_string()),
            PathBuf::from("/data/uploads")
        );
    }

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn partial_config_file_keeps_env_overrides() {
        let file: ConfigFile = toml::from_str(
            r#"
            [server]
            upload_dir = "media"
            "#,
        )
        .unwrap();
        let base = Path::new("/opt/app");

        let config = Config::resolve(
            base,
            file,
            env_of(&[("JWT_SECRET", "prod-secret"), ("PORT", "9999")]),
        );

        assert_eq!(config.jwt_secret, "prod-secret");
        assert_eq!(config.port, 9999);
        assert_eq!(config.upload_dir, PathBuf::from("/opt/app/media"));
        assert_eq!(config.db_file, PathBuf::from("/opt/app/mini_yt.sqlite"));
        assert_eq!(config.thumb_width, 640);
        assert_eq!(config.max_file_size, 500 * 1024 * 1024);
    }

    #[test]
    fn file_values_apply_without_env() {
        let file: ConfigFile = toml::from_str(
            r#"
            [thumbnails]
            width = 320

            [auth]
            jwt_secret = "from-file"
            "#,
        )
        .unwrap();

        let config = Config::resolve(Path::new("/opt/app"), file, |_| None);

        assert_eq!(config.thumb_width, 320);
        assert_eq!(config.jwt_secret, "from-file");
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn huge_upload_limit_saturates() {
        let config = Config::resolve(
            Path::new("/opt/app"),
            ConfigFile::default(),
            env_of(&[("MAX_UPLOAD_MB", "18446744073709551615")]),
        );

        assert_eq!(config.max_file_size, u64::MAX);
    }

    #[test]
    fn invalid_env_values_fall_back() {
        let config = Config::resolve(
            Path::new("/opt/app"),
            ConfigFile::default(),
            env_of(&[
                ("THUMB_TIME_SECONDS", "-3"),
                ("THUMB_WIDTH", "0"),
                ("BCRYPT_COST", "99"),
                ("PORT", "not-a-port"),
            ]),
        );

        assert_eq!(config.thumb_offset_seconds, 1.0);
        assert_eq!(config.thumb_width, 640);
        assert_eq!(config.bcrypt_cost, 10);
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn default_extraction_pool_is_bounded() {
        let slots = default_concurrent_extractions();
        assert!((2..=8).contains(&slots));
    }
}
