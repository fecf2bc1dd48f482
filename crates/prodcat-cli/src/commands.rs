//! Command-line parsing.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Clean raw rows into the corpus; `None` uses today's rollout budget.
    Clean { rows: Option<usize> },
    Train,
    Predict {
        image: PathBuf,
        designation: String,
        description: String,
    },
    /// Predict a random cleaned test document.
    Sample,
    Status,
    Help,
}

pub const USAGE: &str = "\
prodcat: multimodal product category classifier

Usage: prodcat <command>

Commands:
  clean [rows]                               Clean raw tables into the corpus store
  train                                      Clean, featurize, fit and save artifacts
  predict <image> <designation> [description]
                                             Classify one listing
  sample                                     Classify a random cleaned test document
  status                                     Show corpus, artifact and device status
  help                                       Show this help message

Environment:
  PRODCAT_DATA_DIR   data directory (default: data)
  PRODCAT_CONFIG     YAML config file (default: conf/prodcat.yaml)
  RUST_LOG           log filter (default: info)";

impl Command {
    /// Parse `args` without the program name.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let Some(name) = args.first() else {
            return Ok(Self::Help);
        };
        let rest = &args[1..];

        let command = match name.as_str() {
            "clean" => {
                let rows = match rest.first() {
                    Some(raw) => Some(
                        raw.parse::<usize>()
                            .map_err(|_| format!("invalid row count `{}`", raw))?,
                    ),
                    None => None,
                };
                Self::Clean { rows }
            }
            "train" => Self::Train,
            "predict" => match rest {
                [image, designation] => Self::Predict {
                    image: PathBuf::from(image),
                    designation: designation.clone(),
                    description: String::new(),
                },
                [image, designation, description] => Self::Predict {
                    image: PathBuf::from(image),
                    designation: designation.clone(),
                    description: description.clone(),
                },
                _ => return Err("usage: prodcat predict <image> <designation> [description]".into()),
            },
            "sample" => Self::Sample,
            "status" => Self::Status,
            "help" | "--help" | "-h" => Self::Help,
            other => return Err(format!("Unknown command: {}. Use 'prodcat help' for usage.", other)),
        };
        Ok(command)
    }
}
