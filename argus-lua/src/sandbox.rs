//! Lua sandbox creation
//!
//! This module provides a restricted Lua sandbox that prevents access to
//! dangerous operations like filesystem I/O, network access, and process execution.
//!
//! The workflow module is always injected as it's needed for parsing definitions.
//! Definitions only describe stages; no tool is ever run from Lua.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib, Table};

/// Create a restricted Lua sandbox
///
/// This sandbox includes only basic Lua functionality (tables, strings, math)
/// and does NOT include any I/O capabilities or the ability to load external code.
///
/// # Example
/// ```no_run
/// use argus_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
///
/// let source = r#"
///     return workflow.define {
///         name = "subdomains",
///         cadence = "daily",
///         stages = {
///             workflow.stage { name = "enumerate", tool = "subfinder", args = {"-dL", "{input}"} },
///         },
///     }
/// "#;
/// let definition: mlua::Table = lua.load(source).eval()?;
/// let name: String = definition.get("name")?;
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    // Only allow: TABLE, STRING, MATH
    // Explicitly exclude: IO, OS, PACKAGE, DEBUG, COROUTINE
    let lua = unsafe {
        Lua::unsafe_new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH,
            LuaOptions::default(),
        )
    };

    // Remove dangerous globals
    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;
    lua.globals().set("load", mlua::Nil)?;

    register_workflow_module(&lua)?;

    Ok(lua)
}

/// Register the workflow module
///
/// - `workflow.define(t)` returns the definition table as-is
/// - `workflow.stage(t)` marks a command stage
/// - `workflow.fan_out(t)` marks a command stage run once per input line
/// - `workflow.checksum(t)` marks a built-in content checksum stage
fn register_workflow_module(lua: &Lua) -> LuaResult<()> {
    let workflow = lua.create_table()?;

    let define_fn = lua.create_function(|_, definition: Table| Ok(definition))?;
    workflow.set("define", define_fn)?;

    let stage_fn = lua.create_function(|_, stage: Table| {
        stage.set("kind", "command")?;
        Ok(stage)
    })?;
    workflow.set("stage", stage_fn)?;

    let fan_out_fn = lua.create_function(|_, stage: Table| {
        stage.set("kind", "command")?;
        stage.set("fan_out", true)?;
        Ok(stage)
    })?;
    workflow.set("fan_out", fan_out_fn)?;

    let checksum_fn = lua.create_function(|_, stage: Table| {
        stage.set("kind", "checksum")?;
        Ok(stage)
    })?;
    workflow.set("checksum", checksum_fn)?;

    lua.globals().set("workflow", workflow)?;

    Ok(())
}
