use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::mcp::ToolDescriptor;

pub const DEFAULT_MEMBERS_DATABASE: &str = "db/members.db";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("An error occurred: {0}")]
    ExecutionFailed(String),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for ToolError {
    fn from(error: rusqlite::Error) -> Self {
        ToolError::Database(error.to_string())
    }
}

#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn info(&self) -> ToolDescriptor;

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError>;
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn descriptor(name: &str, description: &str, parameters: Value) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: parameters,
    }
}

#[derive(Deserialize)]
struct CommandArgs {
    command: String,
}

#[derive(Default)]
pub struct RunCommandTool {
    working_dir: Option<PathBuf>,
}

impl RunCommandTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(working_dir.into()),
        }
    }
}

#[async_trait]
impl ToolTrait for RunCommandTool {
    fn info(&self) -> ToolDescriptor {
        descriptor(
            "run_command",
            "Run a terminal command and return its output",
            serde_json::json!({
                "type": "object",
                "title": "run_commandArguments",
                "properties": {
                    "command": {
                        "type": "string",
                        "title": "Command",
                        "description": "The command to run"
                    }
                },
                "required": ["command"]
            }),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let CommandArgs { command } = parse_args(arguments)?;

        let mut process = if cfg!(windows) {
            let mut cmd = tokio::process::Command::new("cmd");
            cmd.arg("/C");
            cmd
        } else {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c");
            cmd
        };
        process.arg(&command);
        if let Some(dir) = &self.working_dir {
            process.current_dir(dir);
        }

        tracing::debug!("run_command: {command}");
        let output = process
            .output()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(Value::String(format!("STDOUT: {stdout}\nSTDERR: {stderr}")))
    }
}

#[derive(Deserialize)]
struct AddArgs {
    a: f64,
    b: f64,
}

pub struct AddNumbersTool;

#[async_trait]
impl ToolTrait for AddNumbersTool {
    fn info(&self) -> ToolDescriptor {
        descriptor(
            "add_numbers",
            "Add two numbers together",
            serde_json::json!({
                "type": "object",
                "title": "add_numbersArguments",
                "properties": {
                    "a": {"type": "number", "title": "A"},
                    "b": {"type": "number", "title": "B"}
                },
                "required": ["a", "b"]
            }),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let AddArgs { a, b } = parse_args(arguments)?;
        Ok(serde_json::json!(a + b))
    }
}

pub struct RandomNumberTool;

#[async_trait]
impl ToolTrait for RandomNumberTool {
    fn info(&self) -> ToolDescriptor {
        descriptor(
            "random_number",
            "Generate a random number between 1 and 3",
            serde_json::json!({
                "type": "object",
                "title": "random_numberArguments",
                "properties": {
                    "command": {"type": "string", "title": "Command"}
                },
                "required": ["command"]
            }),
        )
    }

    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        let number: u32 = rand::thread_rng().gen_range(1..=3);
        Ok(serde_json::json!({ "number": number }))
    }
}

#[derive(Deserialize)]
struct LookupArgs {
    name: String,
}

pub struct MemberLookupTool {
    database: PathBuf,
}

impl MemberLookupTool {
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
        }
    }
}

fn lookup_members(database: &Path, name: &str) -> Result<Vec<String>, ToolError> {
    let conn = rusqlite::Connection::open_with_flags(
        database,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )?;
    let mut stmt = conn.prepare("SELECT name FROM members WHERE name LIKE ?1 COLLATE NOCASE")?;
    let pattern = format!("%{name}%");
    let names = stmt
        .query_map([pattern], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

#[async_trait]
impl ToolTrait for MemberLookupTool {
    fn info(&self) -> ToolDescriptor {
        descriptor(
            "lookup_members",
            "Look up lab members by (partial) name",
            serde_json::json!({
                "type": "object",
                "title": "lookup_membersArguments",
                "properties": {
                    "name": {"type": "string", "title": "Name"}
                },
                "required": ["name"]
            }),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let LookupArgs { name } = parse_args(arguments)?;
        let database = self.database.clone();

        let names = tokio::task::spawn_blocking(move || lookup_members(&database, &name))
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("lookup task failed: {e}")))??;

        if names.is_empty() {
            Ok(Value::String("No matching member found.".to_string()))
        } else {
            Ok(Value::String(names.join("\n")))
        }
    }
}

#[derive(Default)]
pub struct ToolManager {
    tools: Vec<Box<dyn ToolTrait>>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn ToolTrait>) {
        let name = tool.info().name;
        self.tools.retain(|t| t.info().name != name);
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolTrait> {
        self.tools
            .iter()
            .find(|t| t.info().name == name)
            .map(|t| t.as_ref())
    }

    pub fn list(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.info().name).collect()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.info()).collect()
    }
}
