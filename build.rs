use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const KEY_PREFIX: &str = "\"ORGANIZER_";

fn rust_sources(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    let mut files = Vec::new();
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// String literals that are exactly an `ORGANIZER_*` name. Format strings
/// such as the warning line prefix do not close right after the name.
fn env_keys_in(source: &str, keys: &mut BTreeSet<String>) {
    let mut rest = source;
    while let Some(start) = rest.find(KEY_PREFIX) {
        let candidate = &rest[start + 1..];
        let len = candidate
            .find(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
            .unwrap_or(candidate.len());
        if candidate[len..].starts_with('"') && len > KEY_PREFIX.len() - 1 {
            keys.insert(candidate[..len].to_string());
        }
        rest = &candidate[len..];
    }
}

fn main() -> std::io::Result<()> {
    let mut keys = BTreeSet::new();
    for file in rust_sources(Path::new("src"))? {
        println!("cargo:rerun-if-changed={}", file.display());
        env_keys_in(&fs::read_to_string(&file)?, &mut keys);
    }

    let out_dir = env::var_os("OUT_DIR").map(PathBuf::from).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR is not set")
    })?;
    let body = keys
        .iter()
        .map(|key| format!("    \"{key}\",\n"))
        .collect::<String>();
    fs::write(
        out_dir.join("organizer_env_allowlist.rs"),
        format!("pub const GENERATED_ENV_ALLOWLIST: &[&str] = &[\n{body}];\n"),
    )?;

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
    Ok(())
}
