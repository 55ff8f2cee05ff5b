use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Agent configuration, loaded from `SERVERSPY_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Listen address (default: 0.0.0.0:8080)
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Control API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Control API request timeout. Unset means calls may block indefinitely.
    #[serde(default)]
    pub api_timeout_secs: Option<u64>,

    /// Upload service host (TLS server name as well)
    #[serde(default = "default_upload_host")]
    pub upload_host: String,

    #[serde(default = "default_upload_port")]
    pub upload_port: u16,

    /// Bound on TCP connect plus TLS handshake to the upload service
    #[serde(default = "default_upload_connect_timeout_secs")]
    pub upload_connect_timeout_secs: u64,

    /// Bytes per upload write
    #[serde(default = "default_upload_chunk_size")]
    pub upload_chunk_size: usize,

    /// PEM bundle of trusted roots for the upload connection
    #[serde(default = "default_ca_bundle")]
    pub ca_bundle: PathBuf,

    /// Root of the metrics pseudo-filesystem
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,

    /// Working path reported by `verify` and mapped when a `map` task
    /// carries no directory. Defaults to the executable's directory.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Serve the informational page to requests without a `TaskId`;
    /// answer 404 instead when false.
    #[serde(default = "default_splash")]
    pub splash: bool,

    /// Path to TLS certificate (enables HTTPS when set with `tls_key`)
    #[serde(default)]
    pub tls_cert: Option<String>,

    /// Path to TLS private key
    #[serde(default)]
    pub tls_key: Option<String>,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_api_base() -> String {
    "https://api.serverspy.io/dev".to_string()
}

fn default_upload_host() -> String {
    "upload.serverspy.io".to_string()
}

fn default_upload_port() -> u16 {
    443
}

fn default_upload_connect_timeout_secs() -> u64 {
    90
}

fn default_upload_chunk_size() -> usize {
    256_000
}

fn default_ca_bundle() -> PathBuf {
    PathBuf::from("/etc/ssl/certs/ca-certificates.crt")
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_splash() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            api_base: default_api_base(),
            api_timeout_secs: None,
            upload_host: default_upload_host(),
            upload_port: default_upload_port(),
            upload_connect_timeout_secs: default_upload_connect_timeout_secs(),
            upload_chunk_size: default_upload_chunk_size(),
            ca_bundle: default_ca_bundle(),
            proc_root: default_proc_root(),
            work_dir: None,
            splash: default_splash(),
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl AgentConfig {
    /// The configured working path, else the directory holding the running
    /// executable, else `.`.
    pub fn resolved_work_dir(&self) -> PathBuf {
        if let Some(dir) = &self.work_dir {
            return dir.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Effective settings as flat strings, reported by `verify`.
    /// TLS key material paths are not included.
    pub fn settings(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("listen_addr".into(), self.listen_addr.to_string());
        out.insert("api_base".into(), self.api_base.clone());
        out.insert(
            "api_timeout_secs".into(),
            self.api_timeout_secs
                .map_or_else(|| "none".to_string(), |s| s.to_string()),
        );
        out.insert("upload_host".into(), self.upload_host.clone());
        out.insert("upload_port".into(), self.upload_port.to_string());
        out.insert(
            "upload_connect_timeout_secs".into(),
            self.upload_connect_timeout_secs.to_string(),
        );
        out.insert(
            "upload_chunk_size".into(),
            self.upload_chunk_size.to_string(),
        );
        out.insert("ca_bundle".into(), self.ca_bundle.display().to_string());
        out.insert("proc_root".into(), self.proc_root.display().to_string());
        out.insert(
            "work_dir".into(),
            self.resolved_work_dir().display().to_string(),
        );
        out.insert("splash".into(), self.splash.to_string());
        out.insert(
            "tls_enabled".into(),
            (self.tls_cert.is_some() && self.tls_key.is_some()).to_string(),
        );
        out
    }
}
