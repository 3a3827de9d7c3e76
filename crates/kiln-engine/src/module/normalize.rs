//! Module specifier normalisation

/// Normalise `specifier` as imported from the unit named `referrer`.
///
/// Specifiers that do not start with `.` are names, not paths, and are
/// returned unchanged. Leading `./` and `../` segments are applied to the
/// referrer's directory; a `..` that would climb above a relative
/// referrer's top directory is kept as written.
///
/// ```text
/// normalize_specifier("./fib.so", "examples/test_fib.js") == "examples/fib.so"
/// normalize_specifier("../lib/a.js", "app/src/main.js")   == "app/lib/a.js"
/// normalize_specifier("std", "app/main.js")               == "std"
/// ```
pub fn normalize_specifier(specifier: &str, referrer: &str) -> String {
    if !specifier.starts_with('.') {
        return specifier.to_string();
    }

    // A leading empty segment marks an absolute referrer
    let mut dir: Vec<&str> = match referrer.rfind('/') {
        Some(at) => referrer[..at].split('/').collect(),
        None => Vec::new(),
    };

    let mut rest = specifier;
    loop {
        if let Some(tail) = rest.strip_prefix("./") {
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("../") {
            match dir.last() {
                Some(&"") if dir.len() == 1 => rest = tail,
                Some(&segment) if segment != ".." && segment != "." => {
                    dir.pop();
                    rest = tail;
                }
                _ => break,
            }
        } else {
            break;
        }
    }

    if dir.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", dir.join("/"), rest)
    }
}
