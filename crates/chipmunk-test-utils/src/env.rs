use std::env;

/// Sets environment variables for the lifetime of the guard.
///
/// Tests using it must pick variable names no other test touches.
#[derive(Debug)]
pub struct EnvGuard {
    names: Vec<String>,
}

impl EnvGuard {
    pub fn set<K, V, I>(vars: I) -> Self
    where
        K: Into<String>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut names = Vec::new();
        for (name, value) in vars {
            let name = name.into();
            // SAFETY: names are unique per test, so no other thread reads them
            // while they change.
            unsafe { env::set_var(&name, value.as_ref()) };
            names.push(name);
        }
        Self { names }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for name in &self.names {
            // SAFETY: see `EnvGuard::set`.
            unsafe { env::remove_var(name) };
        }
    }
}
