use clap::{Parser, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mtpcut", author, version, about, long_about = None)]
pub struct Cli {
    /// Run configuration (key/value lines, terminated by END)
    #[arg(value_hint = ValueHint::FilePath)]
    pub config: PathBuf,

    /// Directory receiving solution, cut and report files
    #[arg(default_value = ".", value_hint = ValueHint::DirPath)]
    pub sols_dir: PathBuf,

    /// Log file, written alongside stdout
    #[arg(default_value = "main.log", value_hint = ValueHint::FilePath)]
    pub logfile: PathBuf,
}
