#![forbid(unsafe_code)]

use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::collector::{RetryPolicy, SortOrder};
use crate::error::ConfigError;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_TARGET_COMMENT_COUNT: usize = 12_000;
pub const DEFAULT_COMMENT_PAGE_SIZE: u32 = 500;
pub const DEFAULT_CAPTION_LANGUAGES: &str = "en";
pub const DEFAULT_COOKIES_BROWSER: &str = "chrome";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";

/// Everything a harvest run needs, resolved once and handed to the assembler.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub api_key: String,
    pub video_id: String,
    pub target_comment_count: usize,
    pub sort_order: SortOrder,
    pub output_dir: PathBuf,
    pub include_replies: bool,
    pub comment_page_size: u32,
    pub caption_languages: Vec<String>,
    pub cookies_browser: String,
    pub yt_dlp_path: PathBuf,
    pub retry: RetryPolicy,
}

/// Values supplied on the command line. They win over the environment and
/// the `.env` file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub video_id: Option<String>,
    /// Negative values clamp to zero.
    pub target_comment_count: Option<i64>,
    pub sort_order: Option<SortOrder>,
    pub output_dir: Option<PathBuf>,
    pub include_replies: Option<bool>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_config(overrides: ConfigOverrides) -> Result<HarvestConfig, ConfigError> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    build_config_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<HarvestConfig, ConfigError> {
    build_config_with_overrides(file_vars, env_lookup, ConfigOverrides::default())
}

fn build_config_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: ConfigOverrides,
) -> Result<HarvestConfig, ConfigError> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let api_key = non_blank(overrides.api_key)
        .or_else(|| lookup("YOUTUBE_API_KEY"))
        .ok_or(ConfigError::Missing("YOUTUBE_API_KEY"))?;
    let video_id = non_blank(overrides.video_id)
        .or_else(|| lookup("VIDEO_ID"))
        .ok_or(ConfigError::Missing("VIDEO_ID"))?;

    let target_comment_count = match overrides.target_comment_count {
        Some(value) => clamp_target_count(value),
        None => parse_or::<i64>("TARGET_COMMENT_COUNT", lookup("TARGET_COMMENT_COUNT"))?
            .map_or(DEFAULT_TARGET_COMMENT_COUNT, clamp_target_count),
    };
    let sort_order = match overrides.sort_order {
        Some(order) => order,
        None => parse_or("SORT_ORDER", lookup("SORT_ORDER"))?.unwrap_or_default(),
    };
    let output_dir = overrides
        .output_dir
        .or_else(|| lookup("OUTPUT_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let include_replies = match overrides.include_replies {
        Some(flag) => flag,
        None => lookup("INCLUDE_REPLIES")
            .map(|value| parse_bool("INCLUDE_REPLIES", &value))
            .transpose()?
            .unwrap_or(false),
    };
    let comment_page_size = parse_or("COMMENT_PAGE_SIZE", lookup("COMMENT_PAGE_SIZE"))?
        .unwrap_or(DEFAULT_COMMENT_PAGE_SIZE);
    if comment_page_size == 0 {
        return Err(ConfigError::Invalid {
            key: "COMMENT_PAGE_SIZE",
            value: "0".into(),
        });
    }
    let caption_languages = split_languages(
        &lookup("CAPTION_LANGUAGES").unwrap_or_else(|| DEFAULT_CAPTION_LANGUAGES.to_string()),
    );
    let cookies_browser =
        lookup("COOKIES_BROWSER").unwrap_or_else(|| DEFAULT_COOKIES_BROWSER.to_string());
    let yt_dlp_path = lookup("YT_DLP_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP));
    let retry = RetryPolicy {
        max_retries: parse_or("MAX_RETRIES", lookup("MAX_RETRIES"))?.unwrap_or(0),
        ..RetryPolicy::default()
    };

    Ok(HarvestConfig {
        api_key,
        video_id,
        target_comment_count,
        sort_order,
        output_dir,
        include_replies,
        comment_page_size,
        caption_languages,
        cookies_browser,
        yt_dlp_path,
        retry,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    raw.map(|value| {
        value
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value })
    })
    .transpose()
}

/// Non-positive targets collect nothing.
fn clamp_target_count(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}

fn split_languages(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| non_blank(file_vars.get(key).cloned()))
}

/// Reads `KEY=value` lines. A missing file is an empty set.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content.lines().filter_map(parse_env_line).collect())
}

fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), unquote(value.trim()).to_string()))
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .into_iter()
        .find_map(|quote| value.strip_prefix(quote)?.strip_suffix(quote))
        .unwrap_or(value)
}
