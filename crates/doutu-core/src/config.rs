use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

pub const DEFAULT_TIMEOUT_MAX: u32 = 15;
pub const DEFAULT_OPT_IN_PHRASE: &str = "开启自动斗图";
pub const DEFAULT_OPT_OUT_PHRASE: &str = "关闭自动斗图";
pub const DEFAULT_OPT_IN_REPLY: &str = "已开启，@我发送文字可以自动斗图";
pub const DEFAULT_OPT_OUT_REPLY: &str = "已关闭";
pub const DEFAULT_MEME_SEARCH_URL: &str = "https://www.doutula.com/search?keyword={keyword}";

/// Which login controller the binary drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginMode {
    /// Background handshake behind the QR web page.
    Web,
    /// Handshake in the foreground; QR image written to a file.
    Terminal,
}

impl LoginMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "web" | "http" => Some(Self::Web),
            "terminal" | "cli" => Some(Self::Terminal),
            _ => None,
        }
    }
}

/// In-chat admin commands and their confirmations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Phrases {
    pub opt_in: String,
    pub opt_out: String,
    pub opt_in_reply: String,
    pub opt_out_reply: String,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            opt_in: DEFAULT_OPT_IN_PHRASE.to_string(),
            opt_out: DEFAULT_OPT_OUT_PHRASE.to_string(),
            opt_in_reply: DEFAULT_OPT_IN_REPLY.to_string(),
            opt_out_reply: DEFAULT_OPT_OUT_REPLY.to_string(),
        }
    }
}

/// Typed configuration, loaded from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_name: Option<String>,
    /// Number of "408" statuses tolerated before the handshake gives up.
    pub timeout_max: u32,
    pub login_mode: LoginMode,
    pub http_addr: SocketAddr,
    pub uuid_wait: Duration,
    pub qr_path: PathBuf,
    pub phrases: Phrases,

    // Meme search
    pub meme_search_url: String,
    pub meme_max_candidates: usize,

    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_name: None,
            timeout_max: DEFAULT_TIMEOUT_MAX,
            login_mode: LoginMode::Web,
            http_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            uuid_wait: Duration::from_secs(60),
            qr_path: env::temp_dir().join("doutu-qr.png"),
            phrases: Phrases::default(),
            meme_search_url: DEFAULT_MEME_SEARCH_URL.to_string(),
            meme_max_candidates: 3,
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).and_then(non_empty);

        let timeout_max = match get("DOUTU_TIMEOUT_MAX") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                Error::Config(format!("DOUTU_TIMEOUT_MAX must be a positive integer, got {raw:?}"))
            })?,
            None => defaults.timeout_max,
        };
        if timeout_max == 0 {
            return Err(Error::Config(
                "DOUTU_TIMEOUT_MAX must be greater than zero".to_string(),
            ));
        }

        let login_mode = match get("DOUTU_LOGIN_MODE") {
            Some(raw) => LoginMode::parse(&raw).ok_or_else(|| {
                Error::Config(format!(
                    "DOUTU_LOGIN_MODE must be `web` or `terminal`, got {raw:?}"
                ))
            })?,
            None => defaults.login_mode,
        };

        let http_addr = match get("DOUTU_HTTP_ADDR") {
            Some(raw) => raw
                .trim()
                .parse::<SocketAddr>()
                .map_err(|e| Error::Config(format!("DOUTU_HTTP_ADDR {raw:?}: {e}")))?,
            None => defaults.http_addr,
        };

        let uuid_wait = parse_u64(get("DOUTU_UUID_WAIT_SECS"))
            .map(Duration::from_secs)
            .unwrap_or(defaults.uuid_wait);
        let http_timeout = parse_u64(get("DOUTU_HTTP_TIMEOUT_SECS"))
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);

        let phrases = Phrases {
            opt_in: get("DOUTU_OPT_IN_PHRASE").unwrap_or(defaults.phrases.opt_in),
            opt_out: get("DOUTU_OPT_OUT_PHRASE").unwrap_or(defaults.phrases.opt_out),
            opt_in_reply: get("DOUTU_OPT_IN_REPLY").unwrap_or(defaults.phrases.opt_in_reply),
            opt_out_reply: get("DOUTU_OPT_OUT_REPLY").unwrap_or(defaults.phrases.opt_out_reply),
        };

        let meme_search_url = get("DOUTU_MEME_SEARCH_URL").unwrap_or(defaults.meme_search_url);
        if !meme_search_url.contains("{keyword}") {
            return Err(Error::Config(
                "DOUTU_MEME_SEARCH_URL must contain a {keyword} placeholder".to_string(),
            ));
        }
        let meme_max_candidates = parse_u64(get("DOUTU_MEME_MAX_CANDIDATES"))
            .map(|n| n.max(1) as usize)
            .unwrap_or(defaults.meme_max_candidates);

        Ok(Self {
            bot_name: get("DOUTU_BOT_NAME"),
            timeout_max,
            login_mode,
            http_addr,
            uuid_wait,
            qr_path: get("DOUTU_QR_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.qr_path),
            phrases,
            meme_search_url,
            meme_max_candidates,
            http_timeout,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_match_original_bot() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.timeout_max, 15);
        assert_eq!(cfg.login_mode, LoginMode::Web);
        assert_eq!(cfg.phrases.opt_in, "开启自动斗图");
        assert_eq!(cfg.phrases.opt_out_reply, "已关闭");
        assert_eq!(cfg.http_addr.port(), 5000);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = load(&[
            ("DOUTU_TIMEOUT_MAX", "3"),
            ("DOUTU_LOGIN_MODE", "terminal"),
            ("DOUTU_HTTP_ADDR", "0.0.0.0:8080"),
            ("DOUTU_UUID_WAIT_SECS", "5"),
            ("DOUTU_BOT_NAME", "斗图机器人"),
        ])
        .unwrap();
        assert_eq!(cfg.timeout_max, 3);
        assert_eq!(cfg.login_mode, LoginMode::Terminal);
        assert_eq!(cfg.http_addr.port(), 8080);
        assert_eq!(cfg.uuid_wait, Duration::from_secs(5));
        assert_eq!(cfg.bot_name.as_deref(), Some("斗图机器人"));
    }

    #[test]
    fn zero_timeout_max_is_rejected() {
        let err = load(&[("DOUTU_TIMEOUT_MAX", "0")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn search_url_needs_placeholder() {
        let err = load(&[("DOUTU_MEME_SEARCH_URL", "https://example.com/search")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn dotenv_lines_strip_quotes_and_comments() {
        let parsed = parse_dotenv("# comment\nA=1\nB = \"two words\"\n\nnot a pair\nC='x'\n");
        assert_eq!(
            parsed,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), "x".to_string()),
            ]
        );
    }
}
