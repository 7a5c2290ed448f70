#[macro_use] extern crate clap;

use clap::{App, ArgMatches};
use env_logger::{from_env, Env};
use freeroot::{CommandInvocation, Sandbox, SandboxBuilder};
use std::{fmt::Display, path::Path, process};

fn main() {
    let yaml = load_yaml!("cli.yml");
    let matches = App::from_yaml(yaml)
        .version(crate_version!())
        .get_matches();

    let log_level = matches.value_of("log_level").unwrap_or("warn");
    from_env(Env::default().default_filter_or(log_level)).init();

    let mut sandbox = or_exit(sandbox_builder(&matches).build());

    let code = match matches.subcommand() {
        ("install", Some(_)) => {
            or_exit(sandbox.install());
            0
        }
        ("run", Some(sub)) => {
            let invocation = invocation(sub);
            or_exit(sandbox.interact(invocation)).code()
        }
        ("shell", Some(_)) => or_exit(sandbox.start_interactive_shell()).code(),
        ("clone", Some(sub)) => {
            let url = sub.value_of("url").unwrap_or_default();
            let output = or_exit(sandbox.clone_repo(
                url,
                sub.value_of("target"),
                sub.value_of("branch"),
            ));
            print!("{}", output.stdout_str());
            eprint!("{}", output.stderr_str());
            0
        }
        ("cleanup", Some(_)) => {
            or_exit(sandbox.cleanup());
            0
        }
        _ => unreachable!("clap requires a subcommand"),
    };
    process::exit(code);
}

fn sandbox_builder(matches: &ArgMatches) -> SandboxBuilder {
    let mut builder = Sandbox::builder();
    if let Some(dir) = matches.value_of("root") {
        builder = builder.root_dir(dir);
    }
    if let Some(dir) = matches.value_of("cache_dir") {
        builder = builder.cache_dir(Path::new(dir));
    }
    if matches.is_present("ephemeral") {
        builder = builder.ephemeral_cache();
    }
    if matches.is_present("offline") {
        builder = builder.offline();
    }
    if let Some(retries) = matches.value_of("retries") {
        builder = builder.retries(or_exit(retries.parse::<u32>()));
    }
    if let Some(arch) = matches.value_of("arch") {
        builder = builder.arch(or_exit(arch.parse()));
    }
    if let Some(url) = matches.value_of("engine_url") {
        builder = builder.engine_url(url);
    }
    if let Some(url) = matches.value_of("rootfs_url") {
        builder = builder.rootfs_url(url);
    }
    if let Some(shell) = matches.value_of("shell") {
        builder = builder.shell(shell);
    }
    builder
}

/// One argument is a shell command line, more than one is an argv
fn invocation(matches: &ArgMatches) -> CommandInvocation {
    let args = string_values(matches, "run_args");
    let mut invocation = if args.len() == 1 {
        CommandInvocation::shell(&args[0])
    } else {
        CommandInvocation::argv(args)
    };
    if let Some(dir) = matches.value_of("workdir") {
        invocation = invocation.current_dir(dir);
    }
    invocation.envs(env_values(matches, "run_env"))
}

fn or_exit<T, E: Display>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            log::error!("{}", err);
            process::exit(0xFF);
        }
    }
}

fn string_values<S: AsRef<str>>(matches: &ArgMatches, name: S) -> Vec<String> {
    matches
        .values_of(name)
        .into_iter()
        .map(|values| values.map(|value| value.to_string()))
        .flatten()
        .collect()
}

fn env_values<S: AsRef<str>>(matches: &ArgMatches, name: S) -> Vec<(String, String)> {
    string_values(matches, name)
        .iter()
        .map(|env_str| {
            let mut parts = env_str.splitn(2, '=');
            (
                parts.next().unwrap_or("").to_string(),
                parts.next().unwrap_or("").to_string(),
            )
        })
        .collect()
}
