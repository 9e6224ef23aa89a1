use anyhow::{anyhow, Result};
use adaptive_quiz::database::{BankCollection, Database};
use adaptive_quiz::models::{Candidate, QuestionSource};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BankQuestionImport {
    question: String,
    #[serde(default)]
    options: Option<Vec<String>>,
    correct_answer: String,
    topic: String,
    grade: u8,
    #[serde(default)]
    concept: Option<String>,
    #[serde(default)]
    subtopic: Option<String>,
    #[serde(default)]
    question_id: Option<String>,
    #[serde(default)]
    owner_id: Option<String>,
    #[serde(default)]
    difficulty: Option<f64>,
}

impl BankQuestionImport {
    fn to_candidate(&self, collection: BankCollection) -> Candidate {
        Candidate {
            question: self.question.clone(),
            options: self.options.clone(),
            correct_answer: self.correct_answer.clone(),
            topic: self.topic.clone(),
            concept: self.concept.clone(),
            subtopic: self.subtopic.clone(),
            question_id: self.question_id.clone(),
            source: match collection {
                BankCollection::Shared => QuestionSource::SharedQuestionBank,
                _ => QuestionSource::QuestionBank,
            },
            difficulty: self.difficulty,
        }
    }
}

#[derive(Debug, Default)]
struct ImportStats {
    total: usize,
    imported: usize,
    skipped: Vec<String>,
    errors: Vec<String>,
}

impl ImportStats {
    fn print_summary(&self, dry_run: bool) {
        println!("\n=== Import Summary ===");
        println!("Questions read: {}", self.total);

        if dry_run {
            println!("Questions that WOULD BE imported: {}", self.imported);
        } else {
            println!("Questions imported: {}", self.imported);
        }

        if !self.skipped.is_empty() {
            println!("Questions skipped: {}", self.skipped.len());
            for reason in &self.skipped {
                println!("  - {}", reason);
            }
        }
        if !self.errors.is_empty() {
            println!("Errors encountered: {}", self.errors.len());
            for error in &self.errors {
                println!("  - {}", error);
            }
        }
        if dry_run {
            println!("\n** DRY RUN MODE - No changes were made **");
        }
    }
}

struct Args {
    file: String,
    collection: BankCollection,
    dry_run: bool,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = env::args().skip(1).collect();
    let dry_run = args.iter().any(|arg| arg == "--dry-run");

    let collection = match args.iter().position(|arg| arg == "--collection") {
        Some(index) => {
            let name = args
                .get(index + 1)
                .ok_or_else(|| anyhow!("--collection needs a value"))?;
            BankCollection::parse(name).ok_or_else(|| anyhow!("Unknown collection '{}'", name))?
        }
        None => BankCollection::Shared,
    };

    let file = args
        .iter()
        .enumerate()
        .find(|(index, arg)| {
            !arg.starts_with("--") && (*index == 0 || args[index - 1] != "--collection")
        })
        .map(|(_, arg)| arg.clone())
        .ok_or_else(|| {
            anyhow!("Usage: import_bank <questions.json> [--collection class|personal|shared] [--dry-run]")
        })?;

    Ok(Args {
        file,
        collection,
        dry_run,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = parse_args()?;

    println!("=== Question Bank Import Tool ===");
    if args.dry_run {
        println!("** RUNNING IN DRY-RUN MODE **");
    }

    let raw = tokio::fs::read_to_string(&args.file).await?;
    let questions: Vec<BankQuestionImport> = serde_json::from_str(&raw)?;
    println!("Read {} questions from {}", questions.len(), args.file);

    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:adaptive_quiz.db".to_string());
    let db = if args.dry_run {
        None
    } else {
        println!("Connecting to database: {}", database_url);
        Some(Database::new(&database_url).await?)
    };

    let mut stats = ImportStats {
        total: questions.len(),
        ..ImportStats::default()
    };

    for (index, entry) in questions.iter().enumerate() {
        let candidate = entry.to_candidate(args.collection);
        if !candidate.is_well_formed() {
            stats.skipped.push(format!("#{}: missing question, answer or options", index));
            continue;
        }
        if args.collection != BankCollection::Shared && entry.owner_id.is_none() {
            stats.skipped.push(format!("#{}: class and personal questions need an ownerId", index));
            continue;
        }

        let Some(db) = &db else {
            stats.imported += 1;
            continue;
        };

        match db
            .insert_bank_question(args.collection, entry.owner_id.as_deref(), entry.grade, &candidate)
            .await
        {
            Ok(question_id) => {
                stats.imported += 1;
                println!("✓ Imported {} ({})", question_id, entry.topic);
            }
            Err(e) => stats.errors.push(format!("#{}: {}", index, e)),
        }
    }

    stats.print_summary(args.dry_run);
    Ok(())
}
