use std::env;
use std::error;

use reqwest::Url;

fn main() -> Result<(), Box<dyn error::Error>> {
    let args: Vec<String> = env::args().collect();
    let base = args
        .get(1)
        .map(String::as_str)
        .unwrap_or("http://127.0.0.1:8000");

    let url = Url::parse(base)?.join("health")?;

    let body = reqwest::blocking::get(url)?;
    if !body.status().is_success() {
        panic!("Request Failed!")
    }

    Ok(())
}
