//! YAML configuration loading (spec.md §6.4).
//!
//! Mirrors the deserialization shape of the teacher's `ClustersConfig`/
//! `Cluster` pair in `cluster_manager.rs`, adapted to the two-site,
//! `sites`/`sm-client`/`flow`/`restrictions` schema the original
//! `init_and_check_config` (`examples/original_source/sm_client/initialization.py`)
//! parses by hand out of a raw YAML document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use dr_core::model::{FlowEntry as CoreFlowEntry, Mode, Site, Verify};

/// A site's bearer token: either given literally, or indirected through an
/// environment variable (`{from_env: VAR}`), matching `initialization.py`'s
/// `isinstance(token, dict)` branch.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TokenSource {
    Literal(String),
    FromEnv { from_env: String },
}

impl TokenSource {
    fn resolve(&self, site_name: &str) -> Result<String> {
        match self {
            TokenSource::Literal(s) => Ok(s.clone()),
            TokenSource::FromEnv { from_env } => std::env::var(from_env).with_context(|| {
                format!("site '{site_name}': token from_env '{from_env}' is not set in the environment")
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    #[serde(rename = "site-manager")]
    pub site_manager: String,
    #[serde(default)]
    pub token: Option<TokenSource>,
    #[serde(default)]
    pub cacert: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SmClientTunables {
    #[serde(default)]
    pub http_auth: Option<bool>,
    #[serde(default)]
    pub service_default_timeout: Option<u64>,
    #[serde(default)]
    pub get_request_timeout: Option<u64>,
    #[serde(default)]
    pub post_request_timeout: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFlowEntry {
    #[serde(flatten)]
    pub entry: BTreeMap<String, Option<Vec<String>>>,
}

/// Raw shape of the YAML document from spec.md §6.4, deserialized before
/// any cross-field validation or resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    pub sites: Vec<SiteConfig>,
    #[serde(rename = "sm-client", default)]
    pub sm_client: SmClientTunables,
    #[serde(default)]
    pub flow: Vec<RawFlowEntry>,
    #[serde(default)]
    pub restrictions: BTreeMap<String, Vec<String>>,
}

/// Fully resolved configuration: tokens indirected through `from_env` have
/// been looked up, defaults have been applied, and shape invariants (exactly
/// two sites, restriction strings matching site count) have been checked.
pub struct Config {
    pub sites: Vec<ResolvedSite>,
    pub http_auth: bool,
    pub service_default_timeout: u64,
    pub get_request_timeout: u64,
    pub post_request_timeout: u64,
    pub flow: Vec<CoreFlowEntry>,
    pub restrictions: BTreeMap<String, Vec<String>>,
}

pub struct ResolvedSite {
    pub name: String,
    pub endpoint: String,
    pub token: Option<String>,
    pub verify: Verify,
}

impl Config {
    /// Loads and fully resolves `path`. `insecure` mirrors the CLI's
    /// `-k/--insecure` flag, overriding every site's `cacert` to "skip
    /// verification" the same way `args.insecure` does in the original.
    pub fn load(path: &Path, insecure: bool) -> Result<Config> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
        let raw: RawConfig = serde_yaml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))?;
        Config::resolve(raw, insecure)
    }

    fn resolve(raw: RawConfig, insecure: bool) -> Result<Config> {
        if raw.sites.len() != 2 {
            bail!("configuration must declare exactly two sites, found {}", raw.sites.len());
        }

        let mut sites = Vec::with_capacity(2);
        for site in &raw.sites {
            if site.site_manager.is_empty() {
                bail!("site '{}' is missing a 'site-manager' URL", site.name);
            }
            let token = match &site.token {
                Some(t) => Some(t.resolve(&site.name)?),
                None => None,
            };
            let verify = if insecure {
                Verify::Skip
            } else {
                match &site.cacert {
                    Some(path) => Verify::Ca(path.clone()),
                    None => Verify::SystemDefault,
                }
            };
            sites.push(ResolvedSite { name: site.name.clone(), endpoint: site.site_manager.clone(), token, verify });
        }

        let flow = resolve_flow(&raw.flow)?;

        for (service, values) in &raw.restrictions {
            for value in values {
                let hyphens = value.matches('-').count();
                if hyphens + 1 != sites.len() {
                    bail!(
                        "restriction '{value}' for '{service}' has {} mode(s), expected {} (one per site)",
                        hyphens + 1,
                        sites.len()
                    );
                }
            }
        }

        Ok(Config {
            sites,
            http_auth: raw.sm_client.http_auth.unwrap_or(false),
            service_default_timeout: raw.sm_client.service_default_timeout.unwrap_or(200),
            get_request_timeout: raw.sm_client.get_request_timeout.unwrap_or(10),
            post_request_timeout: raw.sm_client.post_request_timeout.unwrap_or(30),
            flow,
            restrictions: raw.restrictions,
        })
    }

    /// Builds the two [`Site`] records `dr_core::ClusterState` is seeded
    /// with, in configuration order.
    pub fn sites_for_cluster_state(&self) -> [String; 2] {
        [self.sites[0].name.clone(), self.sites[1].name.clone()]
    }

    pub fn site(&self, name: &str) -> Option<&ResolvedSite> {
        self.sites.iter().find(|s| s.name == name)
    }
}

impl From<&ResolvedSite> for Site {
    fn from(site: &ResolvedSite) -> Self {
        Site {
            name: site.name.clone(),
            endpoint: site.endpoint.clone(),
            token: site.token.clone(),
            verify: site.verify.clone(),
            reachable: None,
            return_code: None,
        }
    }
}

fn resolve_flow(raw: &[RawFlowEntry]) -> Result<Vec<CoreFlowEntry>> {
    if raw.is_empty() {
        return Ok(vec![CoreFlowEntry { module: dr_core::model::DEFAULT_MODULE.to_string(), states: None }]);
    }
    let mut out = Vec::with_capacity(raw.len());
    for entry in raw {
        let Some((module, states)) = entry.entry.iter().next() else {
            bail!("flow entry must name exactly one module");
        };
        let states = match states {
            None => None,
            Some(list) => {
                let mut parsed = Vec::with_capacity(list.len());
                for s in list {
                    let mode = Mode::parse(s).with_context(|| format!("flow entry '{module}' has unknown state '{s}'"))?;
                    parsed.push(mode);
                }
                Some(parsed)
            }
        };
        out.push(CoreFlowEntry { module: module.clone(), states });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_minimal_two_site_config() {
        let f = write_config(
            r#"
sites:
  - name: site-1
    site-manager: https://sm1.example.com
    token: literal-token
  - name: site-2
    site-manager: https://sm2.example.com
"#,
        );
        let cfg = Config::load(f.path(), false).unwrap();
        assert_eq!(cfg.sites.len(), 2);
        assert_eq!(cfg.sites[0].token.as_deref(), Some("literal-token"));
        assert_eq!(cfg.service_default_timeout, 200);
    }

    #[test]
    fn rejects_third_site() {
        let f = write_config(
            r#"
sites:
  - name: site-1
    site-manager: https://sm1.example.com
  - name: site-2
    site-manager: https://sm2.example.com
  - name: site-3
    site-manager: https://sm3.example.com
"#,
        );
        assert!(Config::load(f.path(), false).is_err());
    }

    #[test]
    fn from_env_token_resolves_at_load_time() {
        std::env::set_var("SM_CLIENT_TEST_TOKEN", "from-env-value");
        let f = write_config(
            r#"
sites:
  - name: site-1
    site-manager: https://sm1.example.com
    token:
      from_env: SM_CLIENT_TEST_TOKEN
  - name: site-2
    site-manager: https://sm2.example.com
"#,
        );
        let cfg = Config::load(f.path(), false).unwrap();
        assert_eq!(cfg.sites[0].token.as_deref(), Some("from-env-value"));
    }

    #[test]
    fn missing_env_var_is_configuration_error() {
        std::env::remove_var("SM_CLIENT_TEST_TOKEN_MISSING");
        let f = write_config(
            r#"
sites:
  - name: site-1
    site-manager: https://sm1.example.com
    token:
      from_env: SM_CLIENT_TEST_TOKEN_MISSING
  - name: site-2
    site-manager: https://sm2.example.com
"#,
        );
        assert!(Config::load(f.path(), false).is_err());
    }

    #[test]
    fn restriction_hyphen_count_must_match_site_count() {
        let f = write_config(
            r#"
sites:
  - name: site-1
    site-manager: https://sm1.example.com
  - name: site-2
    site-manager: https://sm2.example.com
restrictions:
  "*":
    - "active-active-active"
"#,
        );
        assert!(Config::load(f.path(), false).is_err());
    }

    #[test]
    fn insecure_flag_overrides_cacert() {
        let f = write_config(
            r#"
sites:
  - name: site-1
    site-manager: https://sm1.example.com
    cacert: /some/path.pem
  - name: site-2
    site-manager: https://sm2.example.com
"#,
        );
        let cfg = Config::load(f.path(), true).unwrap();
        assert!(matches!(cfg.sites[0].verify, Verify::Skip));
    }
}
