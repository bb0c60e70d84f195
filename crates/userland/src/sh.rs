//! The shell: prompt, line editing with path completion, a handful
//! of builtins, and spawn of external programs by name.

use core_readline::{Readline, common_prefix, tabulate};
use core_sys::{Sys, SysError};
use tracing::debug;

use crate::split_command;

const STDOUT: i32 = 1;
const STDERR: i32 = 2;

const BUILTINS: &[&str] = &[
    "cat", "cd", "echo", "exit", "halt", "help", "ls", "pwd", "sysctl",
];

pub async fn run(sys: Sys, _argv: Vec<String>) -> Result<(), String> {
    let code = match shell(&sys).await {
        Ok(code) => code,
        Err(e) => {
            let _ = sys
                .write_all(STDERR, format!("sh: {e}\n").as_bytes())
                .await;
            1
        }
    };
    sys.exit(code).await.map_err(|e| e.to_string())
}

async fn shell(sys: &Sys) -> Result<i32, SysError> {
    let mut rl = Readline::new(sys.clone());
    let completer = sys.clone();
    rl.tab = Some(Box::new(move |line| {
        let sys = completer.clone();
        Box::pin(async move { complete(&sys, line).await })
    }));

    loop {
        let prompt = prompt(sys).await;
        let line = match rl.read(&prompt).await {
            Ok(line) => line,
            Err(SysError::Disconnected) => return Ok(0),
            Err(e) => return Err(e),
        };
        sys.write_all(STDOUT, b"\n").await?;

        let args = split_command(&line);
        if args.is_empty() {
            continue;
        }
        debug!(target: "sh", cmd = %args[0], "command");

        let result = match args[0].as_str() {
            "exit" => return Ok(0),
            "halt" => {
                sys.write_all(STDOUT, b"System shutting down...\n").await?;
                sys.sysctl("kernel.power", Some("0")).await?;
                return Ok(0);
            }
            "help" => cmd_help(sys).await,
            "cd" => cmd_cd(sys, &args).await,
            "pwd" => cmd_pwd(sys).await,
            "ls" => cmd_ls(sys, &args).await,
            "cat" => cmd_cat(sys, &args).await,
            "echo" => cmd_echo(sys, &args).await,
            "sysctl" => cmd_sysctl(sys, &args).await,
            _ => cmd_spawn(sys, &args).await,
        };

        if let Err(e) = result {
            sys.write_all(STDERR, format!("{}: {e}\n", args[0]).as_bytes())
                .await?;
        }
    }
}

/// `terra <wd-basename> $ `.
async fn prompt(sys: &Sys) -> String {
    let wd = sys.getwd().await.unwrap_or_else(|_| "?".to_string());
    format!("terra {} $ ", wd_basename(&wd))
}

fn wd_basename(wd: &str) -> &str {
    wd.rsplit('/').find(|part| !part.is_empty()).unwrap_or("/")
}

async fn cmd_help(sys: &Sys) -> Result<(), SysError> {
    sys.write_all(STDOUT, b"Available commands are:\n").await?;
    for name in BUILTINS {
        sys.write_all(STDOUT, format!("  {name}\n").as_bytes())
            .await?;
    }
    Ok(())
}

async fn cmd_cd(sys: &Sys, args: &[String]) -> Result<(), SysError> {
    let target = args.get(1).map_or("/", String::as_str);
    sys.chdir(target).await?;
    Ok(())
}

async fn cmd_pwd(sys: &Sys) -> Result<(), SysError> {
    let wd = sys.getwd().await?;
    sys.write_all(STDOUT, format!("{wd}\n").as_bytes()).await
}

async fn cmd_ls(sys: &Sys, args: &[String]) -> Result<(), SysError> {
    let targets: Vec<&str> = if args.len() > 1 {
        args[1..].iter().map(String::as_str).collect()
    } else {
        vec!["."]
    };
    for target in targets {
        let names = sys.readdir(target).await?;
        sys.write_all(STDOUT, tabulate(&names).as_bytes()).await?;
    }
    Ok(())
}

async fn cmd_cat(sys: &Sys, args: &[String]) -> Result<(), SysError> {
    for path in &args[1..] {
        let fd = sys.open(path).await?;
        let mut buf = [0u8; 1024];
        loop {
            let n = sys.read(fd, &mut buf).await?;
            if n == 0 {
                break;
            }
            sys.write_all(STDOUT, &buf[..n]).await?;
        }
        sys.close(fd).await?;
    }
    Ok(())
}

async fn cmd_echo(sys: &Sys, args: &[String]) -> Result<(), SysError> {
    let mut line = args[1..].join(" ");
    line.push('\n');
    sys.write_all(STDOUT, line.as_bytes()).await
}

async fn cmd_sysctl(sys: &Sys, args: &[String]) -> Result<(), SysError> {
    for arg in &args[1..] {
        let (name, value) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg.as_str(), None),
        };
        let current = sys.sysctl(name, value).await?;
        sys.write_all(STDOUT, format!("{name}={current}\n").as_bytes())
            .await?;
    }
    Ok(())
}

async fn cmd_spawn(sys: &Sys, args: &[String]) -> Result<(), SysError> {
    let pid = sys.spawn(args, &[0, 1, 2]).await?;
    let code = sys.wait(pid).await?;
    if code != 0 {
        sys.write_all(STDERR, format!("{}: exit {code}\n", args[0]).as_bytes())
            .await?;
    }
    Ok(())
}

/// Path completion for the last token: extend by the longest common
/// prefix of matching directory entries, listing them on ties.
async fn complete(sys: &Sys, line: String) -> (String, Vec<String>) {
    let (head, token) = match line.rsplit_once(char::is_whitespace) {
        Some((head, token)) => (format!("{head} "), token.to_string()),
        None => (String::new(), line.clone()),
    };

    let (dir, base) = match token.rsplit_once('/') {
        Some(("", base)) => ("/".to_string(), base.to_string()),
        Some((dir, base)) => (dir.to_string(), base.to_string()),
        None => (".".to_string(), token.clone()),
    };

    let entries = match sys.readdir(&dir).await {
        Ok(entries) => entries,
        Err(_) => return (line, Vec::new()),
    };
    let matches: Vec<String> = entries
        .into_iter()
        .filter(|name| name.starts_with(&base))
        .collect();
    if matches.is_empty() {
        return (line, Vec::new());
    }

    let extended = common_prefix(&matches);
    let dir_part = match token.rsplit_once('/') {
        Some((cut, _)) => &token[..cut.len() + 1],
        None => "",
    };
    let completed = format!("{head}{dir_part}{extended}");
    if matches.len() > 1 {
        (completed, matches)
    } else {
        (completed, Vec::new())
    }
}
