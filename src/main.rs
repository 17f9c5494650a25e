use std::sync::Arc;

use lightcore::config::AppConfig;
use lightcore::{
    Catalog, ComponentDescriptor, ControllerDescriptor, FileOperation, HandlerMethod,
    ParamBinding, RepositoryDescriptor, RepositoryMethod, RepositoryProxy, ReturnShape,
    ValueShape,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

struct UserRepository;
struct FileRepository;

#[derive(Debug, Serialize, Deserialize)]
struct User {
    #[serde(default)]
    id: Option<i64>,
    name: String,
    #[serde(default)]
    email: Option<String>,
}

struct UserService {
    users: Arc<RepositoryProxy>,
}

impl UserService {
    fn find(&self, id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.users.fetch_one("find_by_id", vec![json!(id)])?)
    }

    fn all(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.users.fetch_all("find_all", vec![])?.unwrap_or_default())
    }

    fn create(&self, user: &User) -> anyhow::Result<lightcore::QueryExecutionResult> {
        Ok(self
            .users
            .execute("insert", vec![json!(user.name), json!(user.email)])?)
    }

    fn delete(&self, id: i64) -> anyhow::Result<lightcore::QueryExecutionResult> {
        Ok(self.users.execute("delete", vec![json!(id)])?)
    }
}

struct UserController {
    service: Arc<UserService>,
}

struct FileController {
    files: Arc<RepositoryProxy>,
}

fn catalog() -> Catalog {
    let users = ControllerDescriptor::new(
        ComponentDescriptor::controller::<UserController>()
            .depends_on::<UserService>()
            .with_factory(|inject| Ok(UserController { service: inject.get()? })),
        "/users",
    )
    .get(
        "/find",
        HandlerMethod::new::<UserController, _, _>(
            "find",
            vec![ParamBinding::query("id", ValueShape::Long)],
            |ctrl, args| ctrl.service.find(args.get(0)?),
        ),
    )
    .get(
        "/all",
        HandlerMethod::new::<UserController, _, _>("all", vec![], |ctrl, _| ctrl.service.all()),
    )
    .post(
        "",
        HandlerMethod::new::<UserController, _, _>("create", vec![ParamBinding::Body], |ctrl, args| {
            ctrl.service.create(&args.get(0)?)
        }),
    )
    .delete(
        "",
        HandlerMethod::new::<UserController, _, _>(
            "delete",
            vec![ParamBinding::query("id", ValueShape::Long)],
            |ctrl, args| ctrl.service.delete(args.get(0)?),
        ),
    );

    let files = ControllerDescriptor::new(
        ComponentDescriptor::controller::<FileController>()
            .depends_on::<FileRepository>()
            .with_factory(|inject| {
                Ok(FileController {
                    files: inject.repository::<FileRepository>()?,
                })
            }),
        "/files",
    )
    .get(
        "/read",
        HandlerMethod::new::<FileController, _, _>(
            "read",
            vec![ParamBinding::query("path", ValueShape::Text)],
            |ctrl, args| {
                let path: String = args.get(0)?;
                Ok(ctrl.files.run_files("read", vec![FileOperation::read(path)])?)
            },
        ),
    );

    Catalog::new()
        .repository(
            RepositoryDescriptor::new::<UserRepository>()
                .method(RepositoryMethod::query(
                    "find_by_id",
                    "SELECT * FROM users WHERE id = ?id",
                    &["id"],
                    ReturnShape::Row,
                ))
                .method(RepositoryMethod::query(
                    "find_all",
                    "SELECT * FROM users",
                    &[],
                    ReturnShape::Rows,
                ))
                .method(RepositoryMethod::query(
                    "insert",
                    "INSERT INTO users (name, email) VALUES (?name, ?email)",
                    &["name", "email"],
                    ReturnShape::Execution,
                ))
                .method(RepositoryMethod::query(
                    "delete",
                    "DELETE FROM users WHERE id = ?id",
                    &["id"],
                    ReturnShape::Execution,
                )),
        )
        .repository(
            RepositoryDescriptor::new::<FileRepository>()
                .method(RepositoryMethod::file("read", ReturnShape::FileResult)),
        )
        .component(
            ComponentDescriptor::service::<UserService>()
                .depends_on::<UserRepository>()
                .with_factory(|inject| {
                    Ok(UserService {
                        users: inject.repository::<UserRepository>()?,
                    })
                }),
        )
        .controller(users)
        .controller(files)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}, database={}@{}:{}/{}",
        config.server_address(),
        config.database.username,
        config.database.host,
        config.database.port,
        config.database.database
    );

    lightcore::run_server(&catalog(), module_path!(), &config).await
}
