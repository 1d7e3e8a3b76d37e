/*
 * Copyright 2023 ByteDance and/or its affiliates.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Command-line options.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "interceptor", about = "Interactive, intercepting HTTP/1.x proxy engine")]
pub struct ProcArgs {
    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Parse the configuration and exit without starting the listener.
    #[arg(long = "test-config")]
    pub test_config: bool,

    /// Path to a JSON file used to persist configuration edits across runs.
    #[arg(long = "state-file", value_name = "FILE")]
    pub state_file: Option<PathBuf>,
}

pub fn parse_clap() -> ProcArgs {
    ProcArgs::parse()
}
