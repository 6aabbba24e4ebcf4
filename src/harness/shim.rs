//! Wrapper scripts that loop a binary name back into the test process.

use std::io;
use std::path::{Path, PathBuf};

use super::launch::INVOCATION_ENV;

/// Quotes `s` for a POSIX shell using single quotes.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Body of the wrapper standing in for `stub_path`.
///
/// The wrapper keeps the caller's stdout on fd 3 and silences fd 1, so that
/// only what the stub handler writes reaches the caller. When `test_name` is
/// set, the re-invoked test binary only runs that test.
pub fn wrapper_script(bash: &Path, stub_path: &str, self_exe: &Path, test_name: Option<&str>) -> String {
    let filter = match test_name {
        Some(name) => format!("{} --exact ", shell_quote(name)),
        None => String::new(),
    };

    format!(
        "#!{} -e\nexec 3>&1 1>/dev/null\n{}={} exec {} {}-- \"$@\"\n",
        bash.display(),
        INVOCATION_ENV,
        shell_quote(stub_path),
        shell_quote(&self_exe.to_string_lossy()),
        filter,
    )
}

/// Writes an executable wrapper named `binary` into `dir`.
pub fn write_wrapper(dir: &Path, binary: &str, contents: &str) -> io::Result<PathBuf> {
    let path = dir.join(binary);
    std::fs::write(&path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    }

    Ok(path)
}
