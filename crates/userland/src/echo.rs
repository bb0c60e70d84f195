//! `echo`: arguments back out on stdout. Exists mostly so spawn/wait
//! has a real external program to exercise.

use core_sys::Sys;

pub async fn run(sys: Sys, argv: Vec<String>) -> Result<(), String> {
    let mut line = argv[1..].join(" ");
    line.push('\n');
    sys.write_all(1, line.as_bytes())
        .await
        .map_err(|e| e.to_string())?;
    sys.exit(0).await.map_err(|e| e.to_string())
}
