#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::{Path, PathBuf};

use clap::Parser;

const CONFIG_ENV: &str = "BULKMAIL_CONFIG";
const SEARCH_PATHS: [&str; 2] = ["./bulkmail.config.ron", "/etc/bulkmail/bulkmail.config.ron"];

/// The bulkmail dispatch service
#[derive(Parser, Debug)]
#[command(name = "bulkmail", version)]
struct Args {
    /// Config file; overrides `BULKMAIL_CONFIG` and the search paths
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let path = locate_config(args.config, std::env::var_os(CONFIG_ENV).map(PathBuf::from))?;

    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Failed to read config from {}: {e}", path.display()))?;
    let bulkmail: bulkmail::Bulkmail = ron::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid config in {}: {e}", path.display()))?;

    bulkmail.run().await
}

/// An explicitly named file must exist; otherwise the first search path
/// that does is used.
fn locate_config(flag: Option<PathBuf>, env: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = flag.or(env) {
        anyhow::ensure!(path.is_file(), "Config file {} does not exist", path.display());
        return Ok(path);
    }

    SEARCH_PATHS
        .iter()
        .map(Path::new)
        .find(|path| path.is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No config file given with --config or {CONFIG_ENV}, and none found at {}",
                SEARCH_PATHS.join(" or ")
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins_over_env() {
        let dir = tempfile::tempdir().expect("tempdir");
        let flag = dir.path().join("flag.ron");
        let env = dir.path().join("env.ron");
        std::fs::write(&flag, "()").expect("write");
        std::fs::write(&env, "()").expect("write");

        let found = locate_config(Some(flag.clone()), Some(env.clone())).expect("found");
        assert_eq!(found, flag);

        let found = locate_config(None, Some(env.clone())).expect("found");
        assert_eq!(found, env);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = locate_config(None, Some(dir.path().join("absent.ron"))).expect_err("missing");

        assert!(err.to_string().contains("absent.ron"), "{err}");
    }
}
