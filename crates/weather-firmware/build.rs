//! Bakes the Wi-Fi credentials into the binary.
//!
//! `WIFI_SSID` and `WIFI_PASS` are taken from the environment, or from a
//! `.env` file in the workspace root or this crate.

const KEYS: [&str; 2] = ["WIFI_SSID", "WIFI_PASS"];

fn main() {
    // A missing .env is fine as long as the variables are set some other way
    let _ = dotenvy::dotenv();

    for key in KEYS {
        println!("cargo:rerun-if-env-changed={key}");
        match dotenvy::var(key) {
            Ok(value) => println!("cargo:rustc-env={key}={value}"),
            Err(_) => {
                println!("cargo:warning={key} is not set, the station will not join a network");
                println!("cargo:rustc-env={key}=");
            }
        }
    }
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-changed=../../.env");

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
