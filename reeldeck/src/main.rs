// CLI over the collection core, backed by the Firebase connectors.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use catalog::{AwardFilter, CollectionClient, IdentityProvider, MovieId, SortSpec};
use firebase::{FirebaseAuth, FirebaseConfig, Firestore, TokenSlot};

#[derive(Parser)]
#[command(name = "reeldeck")]
#[command(about = "Reeldeck - personal movie collection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Account email
    #[arg(long, env = "REELDECK_EMAIL", global = true)]
    email: Option<String>,

    /// Account password
    #[arg(long, env = "REELDECK_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Create the account instead of signing in
    #[arg(long, global = true)]
    sign_up: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the collection
    List {
        /// Sort order: title, title-desc, year, year-desc, rating
        #[arg(short, long, default_value = "title")]
        sort: String,

        /// Case-insensitive search over title, genre and director
        #[arg(long)]
        search: Option<String>,

        /// Show only award winners
        #[arg(long, conflicts_with = "no_award")]
        awarded: bool,

        /// Show only movies without an award
        #[arg(long)]
        no_award: bool,
    },

    /// Add a movie
    Add {
        title: String,

        #[arg(short, long)]
        year: i32,

        #[arg(long, default_value = "")]
        genre: String,

        #[arg(long, default_value = "")]
        director: String,

        /// Poster image URL
        #[arg(long, default_value = "")]
        poster: String,

        /// Rating in half-star units, 0-20
        #[arg(short, long, default_value = "0")]
        rating: u8,

        #[arg(long)]
        awarded: bool,
    },

    /// Update fields of an existing movie
    Set {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        year: Option<i32>,

        #[arg(long)]
        genre: Option<String>,

        #[arg(long)]
        director: Option<String>,

        #[arg(long)]
        poster: Option<String>,

        /// Rating in half-star units, 0-20
        #[arg(short, long)]
        rating: Option<u8>,

        #[arg(long, conflicts_with = "no_award")]
        awarded: bool,

        #[arg(long)]
        no_award: bool,
    },

    /// Delete a movie
    Rm { id: String },
}

fn parse_sort(raw: &str) -> anyhow::Result<SortSpec> {
    match raw {
        "title" => Ok(SortSpec::TitleAsc),
        "title-desc" => Ok(SortSpec::TitleDesc),
        "year" => Ok(SortSpec::YearAsc),
        "year-desc" => Ok(SortSpec::YearDesc),
        "rating" => Ok(SortSpec::RatingDesc),
        other => Err(anyhow!(
            "Invalid sort '{other}'. Expected title, title-desc, year, year-desc or rating"
        )),
    }
}

fn stars(units: u8) -> String {
    format!("{:.1}", f32::from(units) / 2.0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "reeldeck=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let email = cli
        .email
        .context("Missing account email (--email or REELDECK_EMAIL)")?;
    let password = cli
        .password
        .context("Missing account password (--password or REELDECK_PASSWORD)")?;

    let config = FirebaseConfig::from_env()?;
    let token = TokenSlot::new();
    let store = Firestore::new(config.clone(), token.clone())
        .map_err(|e| anyhow!("Store setup failed: {e}"))?;
    let auth = FirebaseAuth::new(config, token).map_err(|e| anyhow!("Auth setup failed: {e}"))?;

    let mut client = CollectionClient::new(store, auth);
    let user = if cli.sign_up {
        client.identity().sign_up(&email, &password).await
    } else {
        client.identity().sign_in(&email, &password).await
    }
    .map_err(|e| anyhow!("Sign-in failed: {e}"))?;
    debug!(user = %user, "signed in");

    client.refresh_session().await;

    match cli.command {
        Commands::List {
            sort,
            search,
            awarded,
            no_award,
        } => {
            let sort = parse_sort(&sort)?;
            if sort == SortSpec::default() {
                // set_sort only re-fetches on a sort change, and the fetch
                // scheduled at sign-in swallows its error. An explicit list
                // must surface a failed fetch, so force one here.
                client.refresh().await;
            } else {
                client.set_sort(sort).await;
            }
            if let Some(term) = search {
                client.set_search(term);
            }
            if awarded {
                client.set_award_filter(AwardFilter::Winners);
            } else if no_award {
                client.set_award_filter(AwardFilter::NonWinners);
            }

            if let Some(catalog::Notice::Error(e)) = client.state().notice() {
                bail!("Fetch failed: {e}");
            }
            for movie in client.state().visible() {
                let award = if movie.received_award { "*" } else { " " };
                println!(
                    "{}  {award} {} ({})  {}  {}",
                    movie.id,
                    movie.title,
                    movie.release_year,
                    stars(movie.rating),
                    movie.genre
                );
            }
        }

        Commands::Add {
            title,
            year,
            genre,
            director,
            poster,
            rating,
            awarded,
        } => {
            let draft = client.draft_mut();
            draft.title = title;
            draft.release_year = Some(year);
            draft.genre = genre;
            draft.director = director;
            draft.poster_url = poster;
            draft.rating = rating;
            draft.received_award = awarded;

            let movie = client
                .submit_create()
                .await
                .map_err(|e| anyhow!("Add failed: {e}"))?;
            println!("{}  {}", movie.id, movie.title);
        }

        Commands::Set {
            id,
            title,
            year,
            genre,
            director,
            poster,
            rating,
            awarded,
            no_award,
        } => {
            let id = MovieId(id);
            if !client.begin_edit(&id) {
                bail!("No movie with id {id}");
            }
            {
                let form = client
                    .edit_draft_mut()
                    .ok_or_else(|| anyhow!("No edit in progress"))?;
                if let Some(title) = title {
                    form.title = title;
                }
                if let Some(year) = year {
                    form.release_year = Some(year);
                }
                if let Some(genre) = genre {
                    form.genre = genre;
                }
                if let Some(director) = director {
                    form.director = director;
                }
                if let Some(poster) = poster {
                    form.poster_url = poster;
                }
                if let Some(rating) = rating {
                    form.rating = rating;
                }
                if awarded {
                    form.received_award = true;
                } else if no_award {
                    form.received_award = false;
                }
            }
            client
                .submit_save()
                .await
                .map_err(|e| anyhow!("Update failed: {e}"))?;
            println!("updated {id}");
        }

        Commands::Rm { id } => {
            let id = MovieId(id);
            client
                .delete(&id)
                .await
                .map_err(|e| anyhow!("Delete failed: {e}"))?;
            println!("deleted {id}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_tokens() {
        assert_eq!(parse_sort("title").unwrap(), SortSpec::TitleAsc);
        assert_eq!(parse_sort("year-desc").unwrap(), SortSpec::YearDesc);
        assert_eq!(parse_sort("rating").unwrap(), SortSpec::RatingDesc);
        assert!(parse_sort("alphabetical").is_err());
    }

    #[test]
    fn test_half_star_units_render_as_stars() {
        assert_eq!(stars(0), "0.0");
        assert_eq!(stars(9), "4.5");
        assert_eq!(stars(20), "10.0");
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
