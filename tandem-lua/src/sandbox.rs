//! Lua sandbox creation
//!
//! Manifests are evaluated in a Lua state that has no I/O, no OS access and
//! no way to load further code. Only table, string and math are available,
//! plus the `tandem` helper table.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib, Table};

/// Upper bound on memory a manifest may allocate while being evaluated
const MANIFEST_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

/// Create a restricted Lua sandbox for manifest evaluation
///
/// # Example
/// ```no_run
/// use tandem_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// let manifest: mlua::Table = lua
///     .load(r#"return tandem.pipeline { id = "dbt", steps = { "dbt-run" } }"#)
///     .eval()?;
/// let id: String = manifest.get("id")?;
/// assert_eq!(id, "dbt");
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH,
        LuaOptions::default(),
    )?;

    lua.set_memory_limit(MANIFEST_MEMORY_LIMIT)?;

    let globals = lua.globals();
    for name in ["require", "dofile", "loadfile", "load", "collectgarbage"] {
        globals.set(name, mlua::Nil)?;
    }

    register_tandem_module(&lua)?;

    Ok(lua)
}

/// Register the `tandem` helper table
///
/// `tandem.job{...}` and `tandem.pipeline{...}` return their argument as-is;
/// they only make manifests read declaratively.
fn register_tandem_module(lua: &Lua) -> LuaResult<()> {
    let tandem = lua.create_table()?;

    let job_fn = lua.create_function(|_, definition: Table| Ok(definition))?;
    tandem.set("job", job_fn)?;

    let pipeline_fn = lua.create_function(|_, definition: Table| Ok(definition))?;
    tandem.set("pipeline", pipeline_fn)?;

    lua.globals().set("tandem", tandem)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_has_no_io() {
        let lua = create_sandbox().unwrap();
        assert!(lua.load("return io.open('/etc/passwd')").exec().is_err());
        assert!(lua.load("return os.getenv('HOME')").exec().is_err());
    }

    #[test]
    fn test_sandbox_cannot_load_code() {
        let lua = create_sandbox().unwrap();
        assert!(lua.load("return require('socket')").exec().is_err());
        assert!(lua.load("return load('return 1')()").exec().is_err());
        assert!(lua.load("return dofile('x.lua')").exec().is_err());
    }

    #[test]
    fn test_sandbox_keeps_string_and_table() {
        let lua = create_sandbox().unwrap();
        let joined: String = lua
            .load(r#"return table.concat({ string.upper("dbt"), "run" }, "-")"#)
            .eval()
            .unwrap();
        assert_eq!(joined, "DBT-run");
    }

    #[test]
    fn test_tandem_helpers_pass_through() {
        let lua = create_sandbox().unwrap();
        let job: Table = lua
            .load(r#"return tandem.job { id = "dbt-run", image = "dbt:latest" }"#)
            .eval()
            .unwrap();
        let id: String = job.get("id").unwrap();
        assert_eq!(id, "dbt-run");
    }
}
