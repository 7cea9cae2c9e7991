//! Shell completion generation for shelastic
//!
//! Generates completion scripts for bash, zsh and fish. The clap-generated
//! script is extended with the values accepted by `--format`, which clap
//! cannot list for a free-form parser.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::{self, Write};

use crate::cli::CliArgs;
use crate::error::{ConfigError, Result, ShelasticError};

const BIN_NAME: &str = "shelastic";

/// Values accepted by `--format`.
const FORMATS: &str = "ndjson array";

/// Generate shell completion script on stdout
///
/// # Arguments
/// * `shell_name` - Shell type (bash, zsh, fish)
///
/// # Returns
/// * `Result<()>` - Success or error
pub fn generate_completion(shell_name: &str) -> Result<()> {
    let shell = parse_shell(shell_name)?;
    let script = render_completion(shell);
    io::stdout().write_all(script.as_bytes())?;
    Ok(())
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        _ => Err(ShelasticError::Config(ConfigError::Generic(format!(
            "Unsupported shell: {}. Supported shells: bash, zsh, fish",
            shell_name
        )))),
    }
}

/// Clap's script followed by the `--format` value completion for `shell`
fn render_completion(shell: Shell) -> String {
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buffer);
    let basic_completion = String::from_utf8_lossy(&buffer);

    let extra = match shell {
        Shell::Bash => format!(
            r#"
_shelastic_enhanced() {{
    local cur prev
    cur="${{COMP_WORDS[COMP_CWORD]}}"
    prev="${{COMP_WORDS[COMP_CWORD-1]}}"

    if [[ "$prev" == "--format" ]]; then
        COMPREPLY=($(compgen -W "{FORMATS}" -- "$cur"))
        return 0
    fi

    _shelastic "$@"
}}

complete -F _shelastic_enhanced -o bashdefault -o default {BIN_NAME}
"#
        ),
        Shell::Zsh => format!(
            r#"
_shelastic_enhanced() {{
    if [[ ${{words[CURRENT-1]}} == "--format" ]]; then
        local -a formats
        formats=({FORMATS})
        _describe 'formats' formats
        return 0
    fi

    _shelastic "$@"
}}

compdef _shelastic_enhanced {BIN_NAME}
"#
        ),
        _ => format!(
            r#"
complete -c {BIN_NAME} -n "__fish_seen_subcommand_from export import" -l format -f -a "{FORMATS}" -d "File format"
"#
        ),
    };

    format!("{basic_completion}{extra}")
}
