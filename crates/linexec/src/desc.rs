use serde::{Deserialize, Serialize};

/// Ordered list of textual commands compiled as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationDesc {
    pub steps: Vec<String>,
}

impl ComputationDesc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a description from text holding one command per line. Blank lines are skipped.
    pub fn parse(text: &str) -> Self {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }

    pub fn push(&mut self, command: impl Into<String>) -> &mut Self {
        self.steps.push(command.into());
        self
    }

    /// Appends `other`'s commands after this description's commands.
    pub fn chain(&mut self, other: &ComputationDesc) -> &mut Self {
        self.steps.extend(other.steps.iter().cloned());
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ComputationDesc {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_appends_in_order() {
        let mut first: ComputationDesc = ["A = multiply M V", "C = add A B"].into_iter().collect();
        let second: ComputationDesc = ["C = multiply C 2.0"].into_iter().collect();
        first.chain(&second);
        assert_eq!(
            first.steps,
            vec!["A = multiply M V", "C = add A B", "C = multiply C 2.0"]
        );
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn parse_skips_blank_lines() {
        let desc = ComputationDesc::parse("\n  A = add B C  \n\nD = multiply A 0.5\n");
        assert_eq!(desc.steps, vec!["A = add B C", "D = multiply A 0.5"]);
    }

    #[test]
    fn serde_uses_steps_field() {
        let desc: ComputationDesc =
            serde_json::from_str(r#"{"steps": ["A = add B C"]}"#).expect("valid json");
        assert_eq!(desc.iter().collect::<Vec<_>>(), vec!["A = add B C"]);
    }
}
