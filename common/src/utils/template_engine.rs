pub use minijinja::{context, Environment, Value};
use std::sync::Arc;

/// Renders prompt templates that are compiled into the binary.
///
/// Templates are registered by name once and shared; names carry no file
/// extension so minijinja never applies HTML auto-escaping to prompt text.
#[derive(Clone, Debug)]
pub struct TemplateEngine {
    env: Arc<Environment<'static>>,
}

impl TemplateEngine {
    pub fn from_templates(
        templates: &[(&'static str, &'static str)],
    ) -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        for (name, source) in templates {
            env.add_template(name, source)?;
        }
        Ok(Self { env: Arc::new(env) })
    }

    pub fn render(&self, name: &str, ctx: &Value) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(ctx)
    }
}
