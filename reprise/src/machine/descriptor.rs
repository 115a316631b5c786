use std::fmt;

/// A self-reported snapshot of a state machine's fields.
///
/// Rendered as the type name on its own line followed by one indented
/// `name: value` line per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachineDescriptor {
    type_name: String,
    fields: Vec<(String, String)>,
}

impl StateMachineDescriptor {
    /// Creates a descriptor with no fields.
    ///
    /// # Arguments
    ///
    /// * `type_name` - Name printed on the first line, usually the machine's
    ///   type name.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a field, rendering `value` with its `Debug` form.
    pub fn field(mut self, name: impl Into<String>, value: &dyn fmt::Debug) -> Self {
        self.fields.push((name.into(), format!("{value:?}")));
        self
    }

    /// Name printed on the first line.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Fields in the order they were added, as `(name, rendered value)`.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

impl fmt::Display for StateMachineDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.type_name)?;

        for (name, value) in &self.fields {
            writeln!(f, "    {name}: {value}")?;
        }

        Ok(())
    }
}
