use std::env;
use std::path::PathBuf;

fn env_path(var: &str) -> Option<PathBuf> {
    env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Where to look when the working directory has no `.env`: an explicit
/// `ORGANIZER_ENV_FILE`, then `.env` at the vault root.
fn fallback_candidates(
    explicit: Option<PathBuf>,
    vault_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Vec<PathBuf> {
    let vault = vault_dir.or_else(|| home_dir.map(|home| home.join("My_Knowledge_Vault")));
    explicit
        .into_iter()
        .chain(vault.map(|v| v.join(".env")))
        .collect()
}

/// Returns the file that was loaded, if any. Variables already set in the
/// process environment are never overridden.
pub fn load_dotenv() -> Option<PathBuf> {
    if let Ok(path) = dotenvy::dotenv() {
        return Some(path);
    }
    let path = fallback_candidates(
        env_path("ORGANIZER_ENV_FILE"),
        env_path("ORGANIZER_VAULT_DIR"),
        dirs::home_dir(),
    )
    .into_iter()
    .find(|p| p.is_file())?;
    dotenvy::from_path(&path).ok().map(|_| path)
}
