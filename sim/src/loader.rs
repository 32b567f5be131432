//! Loading of test artifacts: machine code, assembly source, test
//! script and comparison table, all under `Tests/<name>/`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use regex::Regex;
use tracing::info;

/// Everything found in one test folder. Only the machine code is
/// mandatory; the rest degrade gracefully.
#[derive(Debug, Default)]
pub struct TestBundle {
    pub name: String,
    /// Machine code words, lowest address first.
    pub code: Vec<u16>,
    /// Assembly source, one line per code word after label fusing.
    pub asm: Option<Vec<String>>,
    /// Tokenized test script commands.
    pub script: Option<Vec<String>>,
    /// Comparison table; row 0 names the variables.
    pub results: Option<Vec<Vec<String>>>,
}

impl TestBundle {
    pub fn load(dir: &Path, name: &str) -> Result<TestBundle> {
        let code_file = dir.join(format!("{name}.hack"));
        let code = parse_hack(
            &std::fs::read_to_string(&code_file)
                .with_context(|| format!("could not read file `{}`", code_file.display()))?,
        )
        .with_context(|| format!("while parsing `{}`", code_file.display()))?;
        info!("read code in {}: {} words", code_file.display(), code.len());

        let asm_file = dir.join(format!("{name}.asm"));
        let asm = match std::fs::read_to_string(&asm_file) {
            Ok(text) => {
                let asm = parse_asm(&text);
                info!("read assembly in {}: {} lines", asm_file.display(), asm.len());
                if asm.len() != code.len() {
                    bail!(
                        "`{}` has {} instruction lines but `{}` has {} words",
                        asm_file.display(),
                        asm.len(),
                        code_file.display(),
                        code.len()
                    );
                }
                Some(asm)
            }
            Err(_) => None,
        };

        let script_file = dir.join(format!("{name}.tst"));
        let script = match std::fs::read_to_string(&script_file) {
            Ok(text) => {
                let script = parse_script(&text);
                info!(
                    "read test script in {}: {} commands",
                    script_file.display(),
                    script.len()
                );
                Some(script)
            }
            Err(_) => None,
        };

        let results_file = dir.join(format!("{name}.cmp"));
        let results = match std::fs::read_to_string(&results_file) {
            Ok(text) => {
                let results = parse_results(&text);
                info!(
                    "read test results in {}: {} entries",
                    results_file.display(),
                    results.len()
                );
                Some(results)
            }
            Err(_) => None,
        };

        Ok(TestBundle {
            name: name.to_string(),
            code,
            asm,
            script,
            results,
        })
    }
}

/// `.hack`: one 16-character binary word per line, blanks tolerated.
pub fn parse_hack(text: &str) -> Result<Vec<u16>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            u16::from_str_radix(line, 2)
                .with_context(|| format!("bad machine code word `{line}`"))
        })
        .collect()
}

/// `.asm`: strip `//` comments and blank lines, then fuse label-only
/// lines onto the instruction that follows, so line numbers equal ROM
/// addresses.
pub fn parse_asm(text: &str) -> Vec<String> {
    let stripped: Vec<&str> = text
        .lines()
        .map(|line| line.split("//").next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .collect();

    let mut fused: Vec<String> = Vec::with_capacity(stripped.len());
    let mut pending = String::new();
    for line in stripped {
        if line.starts_with('(') && line.ends_with(')') {
            if pending.is_empty() {
                pending = line.to_string();
            } else {
                pending = format!("{pending} {line}");
            }
        } else if pending.is_empty() {
            fused.push(line.to_string());
        } else {
            fused.push(format!("{pending} {line}"));
            pending.clear();
        }
    }
    // A trailing label with no instruction keeps its own line.
    if !pending.is_empty() {
        fused.push(pending);
    }
    fused
}

/// `.tst`: drop comments, split commands on `,` and `;`, discard the
/// `%` formatting suffixes and lowercase what remains.
pub fn parse_script(text: &str) -> Vec<String> {
    let formatting = Regex::new(r"%[^ ]*").expect("formatting pattern");
    text.lines()
        .map(|line| line.split("//").next().unwrap_or(""))
        .flat_map(|line| line.split([',', ';']))
        .map(|piece| formatting.replace_all(piece, "").trim().to_lowercase())
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// `.cmp`: strip all whitespace and the outer `|` separators, lowercase
/// and split into fields. Every header field missing its trailing `]`
/// gets one appended; some published comparison files are cut short.
pub fn parse_results(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<String>())
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.trim_matches('|')
                .to_lowercase()
                .split('|')
                .map(str::to_string)
                .collect()
        })
        .collect();
    if let Some(header) = rows.first_mut() {
        for field in header.iter_mut() {
            if !field.ends_with(']') {
                field.push(']');
            }
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hack_words_parse_in_order() {
        let code = parse_hack("0000000000001010\n\n1110110000010000\n").unwrap();
        assert_eq!(code, vec![0x000A, 0xEC10]);
        assert!(parse_hack("not binary").is_err());
    }

    #[test]
    fn asm_fuses_labels_downward() {
        let asm = parse_asm(
            "// program\n@10\nD=A // copy\n\n(LOOP)\n@LOOP\n0;JMP\n",
        );
        assert_eq!(
            asm,
            vec!["@10", "D=A", "(LOOP) @LOOP", "0;JMP"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn consecutive_labels_stack_onto_one_line() {
        let asm = parse_asm("(A)\n(B)\nD=A\n");
        assert_eq!(asm, vec!["(A) (B) D=A".to_string()]);
    }

    #[test]
    fn script_tokenizes_and_strips_formatting() {
        let script = parse_script(
            "load Max.hack,\noutput-file Max.out, compare-to Max.cmp,\n\
             output-list RAM[0]%D2.6.2 RAM[1]%D2.6.2;\n\
             repeat 14 { // go\n  ticktock;\n}\noutput;\n",
        );
        assert_eq!(
            script,
            vec![
                "load max.hack",
                "output-file max.out",
                "compare-to max.cmp",
                "output-list ram[0] ram[1]",
                "repeat 14 {",
                "ticktock",
                "}",
                "output",
            ]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
        );
    }

    #[test]
    fn results_normalize_and_repair_headers() {
        let rows = parse_results(
            "|  RAM[0]  |  RAM[1\n|     5    |    32   |\n|    -1    |     0   |\n",
        );
        assert_eq!(rows[0], vec!["ram[0]", "ram[1]"]);
        assert_eq!(rows[1], vec!["5", "32"]);
        assert_eq!(rows[2], vec!["-1", "0"]);
    }
}
