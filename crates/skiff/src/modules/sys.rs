//! The builtin `sys` module.
//!
//! - `argv`: the configured argument vector, `[""]` when none was given
//! - `path`: a one-element list holding the import path
//! - `exit(code=None)`: raises `SystemExit` with `str(code)` as the message

use crate::{
    context::Context,
    exception::{ExcType, RunResult},
    object::Object,
};

pub(crate) fn load(ctx: &mut Context) -> RunResult<()> {
    let argv = if ctx.argv.is_empty() { vec![String::new()] } else { ctx.argv.clone() };
    let mut items = Vec::with_capacity(argv.len());
    for arg in &argv {
        items.push(ctx.create_string(arg)?);
    }
    let argv = ctx.create_list(&items)?;
    ctx.set_global("argv", argv);

    let import_path = ctx.import_path.clone();
    let entry = ctx.create_string(&import_path)?;
    let path = ctx.create_list(&[entry])?;
    ctx.set_global("path", path);

    let exit = ctx.new_function("exit", exit, None)?;
    ctx.set_global("exit", exit);
    Ok(())
}

fn exit(ctx: &mut Context, args: &[Object]) -> RunResult<Object> {
    ctx.check_arg_range(args, 0, 1)?;
    let message = match args.first() {
        Some(&code) if !ctx.is_none(code) => Some(String::from_utf8_lossy(&ctx.text_bytes(code)?).into_owned()),
        _ => None,
    };
    Err(ctx.raise_exception(ExcType::SystemExit, message.as_deref()))
}
