// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Check that gridder arguments make a usable engine.

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::common::{
    display_warnings, make_engine, print_config, GridderArgs, InfoPrinter, ARG_FILE_HELP,
};
use crate::AwGridderError;

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct VerifyConfigArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "gridder")]
    #[serde(default)]
    pub(super) gridder_args: GridderArgs,
}

impl VerifyConfigArgs {
    pub(super) fn merge(self) -> Result<VerifyConfigArgs, AwGridderError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let VerifyConfigArgs {
                args_file: _,
                gridder_args,
            } = unpack_arg_file!(arg_file);

            Ok(VerifyConfigArgs {
                args_file: None,
                gridder_args: cli_args.gridder_args.merge(gridder_args),
            })
        } else {
            Ok(cli_args)
        }
    }

    /// Build the engine the arguments describe, then report its configuration.
    /// Nothing is gridded, so a dry run does the same thing.
    pub(super) fn run(self, _dry_run: bool) -> Result<(), AwGridderError> {
        let config = self.gridder_args.parse()?;
        let engine = make_engine(config)?;

        let mut printer = InfoPrinter::new("Gridder configuration is valid".into());
        print_config(engine.config(), &mut printer);
        printer.display();
        display_warnings();

        info!("As TOML:\n{}", toml::to_string(engine.config())?);
        Ok(())
    }
}
