//! Throw-away dataset tree shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

use nifty_marketdata::{EngineConfig, QueryEngine};

const OPTION_HEADER: &str = "datetime,strike_price,right,open,high,low,close,volume,open_interest";

/// Expiry 01FEB24 traded on 01JAN24. Rows are deliberately out of order and
/// include one malformed line.
const FEB_ON_JAN01: &str = "\
10:00,21700,CE,140,142,139,141.5,50,2100
10:00,21700,PE,95,96,94,95.5,0,1800
10:00,21800,CE,90,91,89,90.5,8,1500
09:15,21600,CE,190,192,188,191,5,900
09:15,21600,PE,60,61,59,60.25,0,700
09:15,21700,CE,130,131,129,130.5,20,2000
09:15,21700,PE,100,101,99,100.5,12,1750
09:15,21800,CE,85,86,84,85.5,3,1400
not-a-time,21700,CE,1,1,1,1,1,1
10:02,21700,CE,141,143,140,142,1,2100
";

/// Expiry 01FEB24 traded on 02JAN24.
const FEB_ON_JAN02: &str = "\
09:15,21700,CE,120,121,119,120.5,7,2200
09:58,21700,CE,118,119,117,118.5,9,2210
10:03,21700,CE,117,118,116,117.5,4,2220
";

/// Weekly expiry 04JAN24 traded on 01JAN24.
const JAN04_ON_JAN01: &str = "\
09:15,21700,CE,40,41,39,40.5,100,5000
09:15,21700,PE,30,31,29,30.5,80,4000
10:00,21800,CE,15,16,14,15.5,60,3000
10:00,21700,PE,28,29,27,28.5,70,4100
10:00,21700,CE,42,43,41,42.5,90,5100
";

/// Monthly expiry 25JAN24 traded on 01JAN24.
const JAN25_ON_JAN01: &str = "\
09:30,21700,CE,110,111,109,110.5,10,800
10:05,21600,PE,70,71,69,70.5,11,600
10:05,21700,CE,112,113,111,112.5,12,810
";

const SPOT_JAN: &str = "\
datetime,close
2024-01-01 09:15:00,21710
2024-01-01 10:00:00,21742
2024-01-01 10:05:00,21760
2024-01-02 09:15:00,21650
2024-01-02 10:00:00,21690
";

fn write_option_file(month_dir: &Path, name: &str, body: &str) {
    fs::write(month_dir.join(name), format!("{}\n{}", OPTION_HEADER, body)).unwrap();
}

/// Build the dataset. When `with_spot` is false the spot directory is left out.
pub fn dataset(with_spot: bool) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let month_dir = dir.path().join("2024").join("2024JAN");
    fs::create_dir_all(&month_dir).unwrap();

    write_option_file(&month_dir, "NIFTY-01FEB24-01JAN24.csv", FEB_ON_JAN01);
    write_option_file(&month_dir, "NIFTY-01FEB24-02JAN24.csv", FEB_ON_JAN02);
    write_option_file(&month_dir, "NIFTY-04JAN24-01JAN24.csv", JAN04_ON_JAN01);
    write_option_file(&month_dir, "NIFTY-25JAN24-01JAN24.csv", JAN25_ON_JAN01);
    fs::write(month_dir.join("README.txt"), "not an option file").unwrap();

    if with_spot {
        write_spot(&dir, SPOT_JAN);
    }
    dir
}

/// Write (or replace) the January 2024 spot file.
pub fn write_spot(dir: &TempDir, body: &str) {
    let spot_dir = dir.path().join("2024").join("2024Nifty");
    fs::create_dir_all(&spot_dir).unwrap();
    fs::write(spot_dir.join("Nifty-2024JAN.csv"), body).unwrap();
}

pub fn engine(dir: &TempDir) -> QueryEngine {
    QueryEngine::new(EngineConfig::new(dir.path())).unwrap()
}

pub fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}
