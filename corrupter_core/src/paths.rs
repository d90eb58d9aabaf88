use std::io;
use std::path::{Path, PathBuf};

/// Derives `{stem}_corrupted{.ext}` in the input's directory.
pub fn default_output_path(input: &Path) -> PathBuf {
    let mut name = input.file_stem().unwrap_or_default().to_os_string();
    name.push("_corrupted");
    if let Some(extension) = input.extension() {
        name.push(".");
        name.push(extension);
    }
    input.with_file_name(name)
}

/// Reports whether two paths name the same file.
///
/// Existing paths are canonicalized. A path that does not exist yet is resolved
/// through its parent directory, so `out.bin` and `./dir/../out.bin` still compare
/// equal before the file is created.
pub fn same_file(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(resolve(a)? == resolve(b)?)
}

fn resolve(path: &Path) -> io::Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    let absolute = std::path::absolute(path)?;
    let resolved = match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => parent.canonicalize().ok().map(|parent| parent.join(name)),
        _ => None,
    };
    Ok(resolved.unwrap_or(absolute))
}
