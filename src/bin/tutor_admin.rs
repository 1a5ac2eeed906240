use std::path::PathBuf;

use clap::Parser;
use roadmap_tutor::{
    config::Config,
    progress,
    store::Store,
    tutor::{self, AssignmentStatus},
    user::{self, Role},
    utils::init_log,
};

#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Administration for the roadmap tutor database")]
struct Args {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    Roadmap {
        #[command(subcommand)]
        command: RoadmapCommand,
    },
    Assignment {
        #[command(subcommand)]
        command: AssignmentCommand,
    },
}

#[derive(Debug, clap::Subcommand)]
enum UserCommand {
    List,
    Create {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(short, long, value_enum, default_value = "learner")]
        role: Role,
    },
}

#[derive(Debug, clap::Subcommand)]
enum RoadmapCommand {
    /// Roadmaps of one user
    List { user_id: i64 },
    Show { id: i64 },
}

#[derive(Debug, clap::Subcommand)]
enum AssignmentCommand {
    List {
        #[arg(short, long, value_enum)]
        status: Option<AssignmentStatus>,
    },
    /// Completes the assignment as the given tutor and reopens its steps
    Complete {
        id: i64,
        #[arg(short, long)]
        tutor_id: i64,
    },
}

#[tokio::main]
async fn main() {
    let _guard = init_log(None).ok();
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let database = args.database.unwrap_or(config.server.database);
    let store = Store::connect(&database).await?;
    store.init_schema().await?;

    match args.command {
        Commands::User { command } => match command {
            UserCommand::List => {
                for user in user::list_users(&store).await? {
                    println!(
                        "{:<6} {:<8} {:<30} {}",
                        user.id,
                        format!("{:?}", user.role),
                        user.email,
                        user.name
                    );
                }
            }
            UserCommand::Create {
                name,
                email,
                password,
                role,
            } => {
                let id = user::create_user(&store, name, email, password, role).await?;
                println!("{:?} created with id: {}", role, id);
            }
        },
        Commands::Roadmap { command } => match command {
            RoadmapCommand::List { user_id } => {
                for roadmap in store.list_roadmaps(user_id).await? {
                    println!(
                        "{:<6} {:<10} {:<3} steps  {}",
                        roadmap.id,
                        format!("{:?}", roadmap.status),
                        roadmap.total_steps,
                        roadmap.title
                    );
                }
            }
            RoadmapCommand::Show { id } => {
                let roadmap = store
                    .get_roadmap(id)
                    .await?
                    .ok_or(anyhow::anyhow!("roadmap {} not found", id))?;
                println!("{} ({}, {:?})", roadmap.title, roadmap.subject, roadmap.status);
                let steps = store.list_steps(id).await?;
                for step in &steps {
                    println!(
                        "{:>3}. {:<40} {:<16} attempts {:<3} score {}",
                        step.order,
                        step.title,
                        step.status.to_string(),
                        step.attempts,
                        step.current_score
                            .map(|s| s.to_string())
                            .unwrap_or("-".to_string())
                    );
                }
                if progress::roadmap_finished(&steps) {
                    println!("All steps completed");
                }
            }
        },
        Commands::Assignment { command } => match command {
            AssignmentCommand::List { status } => {
                for assignment in tutor::list_assignments(&store, status).await? {
                    println!(
                        "{:<6} {:<12} student {:<6} roadmap {:<6} steps {:?}  {}",
                        assignment.id,
                        format!("{:?}", assignment.status),
                        assignment.student_id,
                        assignment.roadmap_id,
                        assignment.step_ids,
                        assignment.reason
                    );
                }
            }
            AssignmentCommand::Complete { id, tutor_id } => {
                let tutor = user::get_user_info(&store, tutor_id).await?;
                if !tutor.role.can_tutor() {
                    anyhow::bail!("user {} is not a tutor", tutor_id);
                }
                let done = tutor::complete_assignment(&store, tutor_id, id).await?;
                println!(
                    "Assignment {} completed, reopened steps {:?}",
                    id, done.released_steps
                );
            }
        },
    }
    Ok(())
}
