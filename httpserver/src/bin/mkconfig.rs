//! Builds a viewer config from NUL-separated `name\0url` lines on stdin.

use std::error::Error;
use std::io::{self, BufRead};

use serde_json::json;
use simple_error::bail;

fn main() -> Result<(), Box<dyn Error>> {
    let mut records = vec![];
    for line in io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim_end();
        let [name, url] = *line.split('\0').collect::<Vec<_>>() else {
            bail!("malformed line: {line:?}");
        };
        let record = json!({"name": name, "url": url});
        eprintln!("{record}");
        records.push(record);
    }
    let config = json!({"dataFilesList": records});
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
