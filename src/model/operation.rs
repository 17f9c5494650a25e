use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One SQL statement sent to the query worker.
///
/// Parameters are positional; the worker binds them to `?` markers in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOperation {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl QueryOperation {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Actions understood by the file worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileAction {
    ReadFile,
    WriteFile,
    DeleteFile,
    ListDir,
    CreateDir,
    MoveFile,
    CopyFile,
    FileStats,
}

impl FileAction {
    /// The action name the file worker understands.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileAction::ReadFile => "readFile",
            FileAction::WriteFile => "writeFile",
            FileAction::DeleteFile => "deleteFile",
            FileAction::ListDir => "listDir",
            FileAction::CreateDir => "createDir",
            FileAction::MoveFile => "moveFile",
            FileAction::CopyFile => "copyFile",
            FileAction::FileStats => "fileStats",
        }
    }
}

/// One file action sent to the file worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOperation {
    pub action: FileAction,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    // The worker reads move/copy endpoints from `from`/`to`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl FileOperation {
    pub fn new(action: FileAction, path: impl Into<String>) -> Self {
        Self {
            action,
            path: path.into(),
            encoding: None,
            content: None,
            new_path: None,
            options: None,
            from: None,
            to: None,
        }
    }

    pub fn read(path: impl Into<String>) -> Self {
        Self::new(FileAction::ReadFile, path)
    }

    pub fn write(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::new(FileAction::WriteFile, path)
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(FileAction::DeleteFile, path)
    }

    pub fn list_dir(path: impl Into<String>) -> Self {
        Self::new(FileAction::ListDir, path)
    }

    pub fn create_dir(path: impl Into<String>) -> Self {
        Self::new(FileAction::CreateDir, path)
    }

    pub fn stats(path: impl Into<String>) -> Self {
        Self::new(FileAction::FileStats, path)
    }

    pub fn move_to(path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self::relocation(FileAction::MoveFile, path.into(), new_path.into())
    }

    pub fn copy_to(path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self::relocation(FileAction::CopyFile, path.into(), new_path.into())
    }

    fn relocation(action: FileAction, path: String, new_path: String) -> Self {
        Self {
            from: Some(path.clone()),
            to: Some(new_path.clone()),
            new_path: Some(new_path),
            ..Self::new(action, path)
        }
    }

    /// Sets the content encoding (`utf8`, `binary`, ...).
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_operation_wire_shape() {
        let op = QueryOperation::new("SELECT * FROM users WHERE id=?", vec![json!(1)]);
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"sql": "SELECT * FROM users WHERE id=?", "params": [1]})
        );
    }

    #[test]
    fn test_file_operation_omits_unset_fields() {
        let op = FileOperation::read("/tmp/a.txt");
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"action": "readFile", "path": "/tmp/a.txt"})
        );
    }

    #[test]
    fn test_move_carries_worker_endpoints() {
        let op = FileOperation::move_to("/tmp/a.txt", "/tmp/b.txt");
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["action"], "moveFile");
        assert_eq!(value["newPath"], "/tmp/b.txt");
        assert_eq!(value["from"], "/tmp/a.txt");
        assert_eq!(value["to"], "/tmp/b.txt");
    }

    #[test]
    fn test_file_operation_from_wire_value() {
        let op: FileOperation = serde_json::from_value(json!({
            "action": "writeFile",
            "path": "/tmp/out.txt",
            "content": "hello",
            "encoding": "utf8",
            "options": {"recursive": true}
        }))
        .unwrap();
        assert_eq!(op.action, FileAction::WriteFile);
        assert_eq!(op.content.as_deref(), Some("hello"));
        assert_eq!(op.options.unwrap()["recursive"], json!(true));
    }

    #[test]
    fn test_action_names_match_wire_names() {
        for action in [
            FileAction::ReadFile,
            FileAction::WriteFile,
            FileAction::DeleteFile,
            FileAction::ListDir,
            FileAction::CreateDir,
            FileAction::MoveFile,
            FileAction::CopyFile,
            FileAction::FileStats,
        ] {
            assert_eq!(json!(action), json!(action.as_str()));
        }
    }

    #[test]
    fn test_builder_options() {
        let op = FileOperation::create_dir("/tmp/x").with_option("recursive", json!(true));
        assert_eq!(op.options.unwrap()["recursive"], json!(true));
    }
}
