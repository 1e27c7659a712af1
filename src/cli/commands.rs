use std::fmt::Write as _;
use std::io::{self, Read};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use time::format_description::well_known::Rfc3339;
use time::format_description::{self, FormatItem};
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use super::render::{money, TextTable};
use super::rows::{render_rows, Lookup, Row};
use super::Commands;
use crate::app::App;
use crate::backend::{Credentials, Filter, FilterOp};
use crate::category::{search_icons, CategoryIndex, ColorPalette, PALETTE};
use crate::editor::{CategoryField, EditorDialog};
use crate::error::StoreError;
use crate::models::{
    normalize_symbol, parse_tags, BudgetItem, CalendarEvent, CategoryDraft, EventColor, Expense,
    ExpenseCategory, Investment, MonthKey, Note, NoteCategory, Reference, Resource, SortDirection,
    SortField, SortSpec, Todo,
};
use crate::reports;
use crate::store::{parse_date_range, RangeFilter, ResourceStore, ViewQuery};

static DATE_FORMAT: Lazy<Vec<FormatItem<'static>>> = Lazy::new(|| {
    format_description::parse("[year]-[month]-[day]").expect("valid date format description")
});

static MINUTE_FORMAT: Lazy<Vec<FormatItem<'static>>> = Lazy::new(|| {
    format_description::parse("[year]-[month]-[day] [hour]:[minute]")
        .expect("valid minute format description")
});

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Case-insensitive text filter
    #[arg(long)]
    pub search: Option<String>,
    /// Only rows in this category (name or id)
    #[arg(long)]
    pub category: Option<String>,
    /// Sort by created, title, date or amount
    #[arg(long)]
    pub sort: Option<SortField>,
    /// Ascending order
    #[arg(long, conflicts_with = "desc")]
    pub asc: bool,
    /// Descending order
    #[arg(long)]
    pub desc: bool,
    /// Date range: YYYY-MM-DD, YYYY-MM or FROM..TO
    #[arg(long)]
    pub during: Option<String>,
    /// Maximum rows printed (0 prints everything)
    #[arg(long)]
    pub limit: Option<usize>,
}

impl ListArgs {
    fn view_query(&self, default: SortSpec, categories: Option<&CategoryIndex>) -> Result<ViewQuery> {
        let mut query = ViewQuery::search(self.search.clone().unwrap_or_default());
        if self.sort.is_some() || self.asc || self.desc {
            let direction = if self.asc {
                SortDirection::Ascending
            } else if self.desc {
                SortDirection::Descending
            } else {
                default.direction
            };
            query = query.sorted(self.sort.unwrap_or(default.field), direction);
        }
        if let Some(raw) = &self.category {
            let id = categories
                .and_then(|index| resolve_category(index, raw))
                .unwrap_or_else(|| raw.trim().to_string());
            query = query.in_category(id);
        }
        if let Some(raw) = &self.during {
            let Some(range) = parse_date_range(raw) else {
                bail!("cannot parse date range '{raw}' (use YYYY-MM-DD, YYYY-MM or FROM..TO)");
            };
            query = query.within(range);
        }
        Ok(query)
    }
}

#[derive(Args, Debug, Clone)]
pub struct IdArg {
    /// Row id or a unique prefix of it
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct CredentialArgs {
    pub email: String,
    /// Read from stdin (or prompted) when omitted
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommand {
    /// Create an account and sign in
    Signup(CredentialArgs),
    /// Sign in to an existing account
    Login(CredentialArgs),
    /// End the saved session
    Logout,
    /// Show the signed-in user
    Whoami,
}

#[derive(Subcommand, Debug, Clone)]
pub enum NoteCommand {
    Add(NoteAddArgs),
    List(ListArgs),
    Edit(NoteEditArgs),
    Delete(IdArg),
}

#[derive(Args, Debug, Clone)]
pub struct NoteAddArgs {
    pub title: String,
    /// Note body; pass '-' to read it from stdin
    #[arg(long)]
    pub content: Option<String>,
    /// Category name or id
    #[arg(long)]
    pub category: Option<String>,
    /// Create the category if no category has that name
    #[arg(long, requires = "category")]
    pub create_category: bool,
}

#[derive(Args, Debug, Clone)]
pub struct NoteEditArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    /// New body; pass '-' to read it from stdin
    #[arg(long)]
    pub content: Option<String>,
    #[arg(long, conflicts_with = "no_category")]
    pub category: Option<String>,
    #[arg(long, requires = "category")]
    pub create_category: bool,
    /// Remove the category
    #[arg(long)]
    pub no_category: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TodoCommand {
    Add(TodoAddArgs),
    List(ListArgs),
    Edit(TodoEditArgs),
    /// Mark a todo as completed (or open again with --undo)
    Done(TodoDoneArgs),
    Delete(IdArg),
}

#[derive(Args, Debug, Clone)]
pub struct TodoAddArgs {
    pub text: String,
    /// Due date (YYYY-MM-DD or "today")
    #[arg(long)]
    pub due: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TodoEditArgs {
    pub id: String,
    #[arg(long)]
    pub text: Option<String>,
    #[arg(long, conflicts_with = "no_due")]
    pub due: Option<String>,
    #[arg(long)]
    pub no_due: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TodoDoneArgs {
    pub id: String,
    #[arg(long)]
    pub undo: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum EventCommand {
    Add(EventAddArgs),
    List(ListArgs),
    Edit(EventEditArgs),
    Delete(IdArg),
}

#[derive(Args, Debug, Clone)]
pub struct EventAddArgs {
    pub title: String,
    /// Start as RFC 3339, "YYYY-MM-DD HH:MM" (UTC) or a date
    #[arg(long)]
    pub start: String,
    #[arg(long)]
    pub end: Option<String>,
    #[arg(long)]
    pub all_day: bool,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub color: Option<EventColor>,
}

#[derive(Args, Debug, Clone)]
pub struct EventEditArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub start: Option<String>,
    #[arg(long)]
    pub end: Option<String>,
    #[arg(long)]
    pub all_day: Option<bool>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub color: Option<EventColor>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReferenceCommand {
    Add(ReferenceAddArgs),
    List(ListArgs),
    Edit(ReferenceEditArgs),
    Delete(IdArg),
}

#[derive(Args, Debug, Clone)]
pub struct ReferenceAddArgs {
    pub title: String,
    pub url: String,
    #[arg(long)]
    pub description: Option<String>,
    /// Comma separated tags
    #[arg(long)]
    pub tags: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ReferenceEditArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Replaces all tags; pass "" to clear them
    #[arg(long)]
    pub tags: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ExpenseCommand {
    Add(ExpenseAddArgs),
    List(ListArgs),
    Edit(ExpenseEditArgs),
    Delete(IdArg),
}

#[derive(Args, Debug, Clone)]
pub struct ExpenseAddArgs {
    pub amount: Decimal,
    /// Category name or id
    #[arg(long)]
    pub category: String,
    #[arg(long)]
    pub create_category: bool,
    /// Defaults to today
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ExpenseEditArgs {
    pub id: String,
    #[arg(long)]
    pub amount: Option<Decimal>,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long, requires = "category")]
    pub create_category: bool,
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum InvestmentCommand {
    Add(InvestmentAddArgs),
    List(ListArgs),
    Edit(InvestmentEditArgs),
    Delete(IdArg),
}

#[derive(Args, Debug, Clone)]
pub struct InvestmentAddArgs {
    pub symbol: String,
    pub shares: Decimal,
    /// Price paid per share
    pub price: Decimal,
    /// Purchase date, defaults to today
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct InvestmentEditArgs {
    pub id: String,
    #[arg(long)]
    pub symbol: Option<String>,
    #[arg(long)]
    pub shares: Option<Decimal>,
    #[arg(long)]
    pub price: Option<Decimal>,
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BudgetCommand {
    Add(BudgetAddArgs),
    List(ListArgs),
    Edit(BudgetEditArgs),
    Delete(IdArg),
}

#[derive(Args, Debug, Clone)]
pub struct BudgetAddArgs {
    /// Expense category name or id
    pub category: String,
    pub amount: Decimal,
    /// YYYY-MM, defaults to the current month
    #[arg(long)]
    pub month: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct BudgetEditArgs {
    pub id: String,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub amount: Option<Decimal>,
    #[arg(long)]
    pub month: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    Expense,
    Note,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
    Add(CategoryAddArgs),
    List(CategoryListArgs),
    Edit(CategoryEditArgs),
    Delete(CategoryDeleteArgs),
    /// Search the icon palette
    Icons {
        #[arg(default_value = "")]
        query: String,
    },
    /// Show the color palette
    Colors,
}

#[derive(Args, Debug, Clone)]
pub struct CategoryAddArgs {
    pub kind: CategoryKind,
    pub name: String,
    /// Palette name (e.g. teal) or #RRGGBB
    #[arg(long)]
    pub color: Option<String>,
    /// Icon search term (expense categories only)
    #[arg(long)]
    pub icon: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CategoryListArgs {
    pub kind: CategoryKind,
    #[command(flatten)]
    pub list: ListArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CategoryEditArgs {
    pub kind: CategoryKind,
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub color: Option<String>,
    /// Icon search term; pass "" to remove the icon
    #[arg(long)]
    pub icon: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CategoryDeleteArgs {
    pub kind: CategoryKind,
    pub id: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReportCommand {
    /// Spending per category for a month
    Expenses {
        #[arg(long)]
        month: Option<String>,
    },
    /// Planned against spent for a month
    Budget {
        #[arg(long)]
        month: Option<String>,
    },
    /// Holdings and cost basis
    Portfolio,
    /// Completion counts
    Todos,
    /// Events in the coming days
    Upcoming {
        /// Window length, at most 100 years
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(i64).range(0..=36_525))]
        days: i64,
    },
}

/// Runs one command and returns what should be printed on stdout.
pub fn dispatch(app: &App, command: Commands) -> Result<String> {
    match command {
        Commands::Auth(cmd) => auth(app, cmd),
        Commands::Note(cmd) => notes(app, cmd),
        Commands::Todo(cmd) => todos(app, cmd),
        Commands::Event(cmd) => events(app, cmd),
        Commands::Ref(cmd) => references(app, cmd),
        Commands::Expense(cmd) => expenses(app, cmd),
        Commands::Invest(cmd) => investments(app, cmd),
        Commands::Budget(cmd) => budget(app, cmd),
        Commands::Category(cmd) => categories(app, cmd),
        Commands::Report(cmd) => report(app, cmd),
    }
}

fn auth(app: &App, command: AuthCommand) -> Result<String> {
    match command {
        AuthCommand::Signup(args) => {
            let credentials = credentials(args)?;
            let session = app.session().sign_up(app.backend(), &credentials)?;
            Ok(format!("Signed up as {}\n", session.email))
        }
        AuthCommand::Login(args) => {
            let credentials = credentials(args)?;
            let session = app.session().sign_in(app.backend(), &credentials)?;
            Ok(format!("Signed in as {}\n", session.email))
        }
        AuthCommand::Logout => {
            if !app.session().is_authenticated() {
                return Ok("Not signed in.\n".to_string());
            }
            app.session().sign_out(app.backend())?;
            Ok("Signed out.\n".to_string())
        }
        AuthCommand::Whoami => Ok(match app.session().current() {
            Some(session) => format!("{} ({})\n", session.email, session.user_id),
            None => "Not signed in.\n".to_string(),
        }),
    }
}

fn credentials(args: CredentialArgs) -> Result<Credentials> {
    let password = match args.password {
        Some(password) => password,
        None => read_password()?,
    };
    Credentials::new(&args.email, &password)
}

fn notes(app: &App, command: NoteCommand) -> Result<String> {
    match command {
        NoteCommand::Add(args) => {
            let mut store = app.store::<Note>();
            let mut dialog = EditorDialog::<Note>::new();
            let draft = dialog.open_new();
            draft.title = args.title;
            draft.content = body_arg(args.content)?.unwrap_or_default();
            if let Some(raw) = &args.category {
                let index = app.note_categories()?;
                attach_category::<Note, NoteCategory>(
                    app,
                    &mut dialog,
                    &index,
                    raw,
                    args.create_category,
                )?;
            }
            saved_id(dialog.save(&mut store)?)
        }
        NoteCommand::List(args) => {
            let index = app.note_categories()?;
            let query = args.view_query(Note::DEFAULT_ORDER, Some(&index))?;
            let lookup = Lookup {
                note: Some(index),
                ..Lookup::default()
            };
            list::<Note>(app, &args, &query, &lookup, false)
        }
        NoteCommand::Edit(args) => {
            let mut store = app.store::<Note>();
            let mut dialog = open_edit(&mut store, &args.id)?;
            if let Some(draft) = dialog.draft_mut() {
                if let Some(title) = args.title {
                    draft.title = title;
                }
                if let Some(content) = body_arg(args.content)? {
                    draft.content = content;
                }
                if args.no_category {
                    draft.category_id = None;
                }
            }
            if let Some(raw) = &args.category {
                let index = app.note_categories()?;
                attach_category::<Note, NoteCategory>(
                    app,
                    &mut dialog,
                    &index,
                    raw,
                    args.create_category,
                )?;
            }
            dialog.save(&mut store)?;
            Ok(String::new())
        }
        NoteCommand::Delete(args) => delete::<Note>(app, &args.id),
    }
}

fn todos(app: &App, command: TodoCommand) -> Result<String> {
    match command {
        TodoCommand::Add(args) => {
            let mut store = app.store::<Todo>();
            let mut dialog = EditorDialog::<Todo>::new();
            let draft = dialog.open_new();
            draft.text = args.text;
            draft.due_date = args.due.as_deref().map(parse_date).transpose()?;
            saved_id(dialog.save(&mut store)?)
        }
        TodoCommand::List(args) => {
            let query = args.view_query(Todo::DEFAULT_ORDER, None)?;
            list::<Todo>(app, &args, &query, &Lookup::default(), false)
        }
        TodoCommand::Edit(args) => {
            let mut store = app.store::<Todo>();
            let mut dialog = open_edit(&mut store, &args.id)?;
            if let Some(draft) = dialog.draft_mut() {
                if let Some(text) = args.text {
                    draft.text = text;
                }
                if let Some(due) = &args.due {
                    draft.due_date = Some(parse_date(due)?);
                }
                if args.no_due {
                    draft.due_date = None;
                }
            }
            dialog.save(&mut store)?;
            Ok(String::new())
        }
        TodoCommand::Done(args) => {
            let mut store = app.store::<Todo>();
            let mut dialog = open_edit(&mut store, &args.id)?;
            if let Some(draft) = dialog.draft_mut() {
                draft.completed = !args.undo;
            }
            dialog.save(&mut store)?;
            Ok(String::new())
        }
        TodoCommand::Delete(args) => delete::<Todo>(app, &args.id),
    }
}

fn events(app: &App, command: EventCommand) -> Result<String> {
    match command {
        EventCommand::Add(args) => {
            let mut store = app.store::<CalendarEvent>();
            let mut dialog = EditorDialog::<CalendarEvent>::new();
            let draft = dialog.open_new();
            draft.title = args.title;
            draft.start_time = parse_datetime(&args.start)?;
            draft.end_time = args.end.as_deref().map(parse_datetime).transpose()?;
            draft.all_day = args.all_day;
            draft.description = args.description;
            draft.color = args.color;
            saved_id(dialog.save(&mut store)?)
        }
        EventCommand::List(args) => {
            let query = args.view_query(CalendarEvent::DEFAULT_ORDER, None)?;
            list::<CalendarEvent>(app, &args, &query, &Lookup::default(), true)
        }
        EventCommand::Edit(args) => {
            let mut store = app.store::<CalendarEvent>();
            let mut dialog = open_edit(&mut store, &args.id)?;
            if let Some(draft) = dialog.draft_mut() {
                if let Some(title) = args.title {
                    draft.title = title;
                }
                if let Some(start) = &args.start {
                    draft.start_time = parse_datetime(start)?;
                }
                if let Some(end) = &args.end {
                    draft.end_time = Some(parse_datetime(end)?);
                }
                if let Some(all_day) = args.all_day {
                    draft.all_day = all_day;
                }
                if args.description.is_some() {
                    draft.description = args.description;
                }
                if args.color.is_some() {
                    draft.color = args.color;
                }
            }
            dialog.save(&mut store)?;
            Ok(String::new())
        }
        EventCommand::Delete(args) => delete::<CalendarEvent>(app, &args.id),
    }
}

fn references(app: &App, command: ReferenceCommand) -> Result<String> {
    match command {
        ReferenceCommand::Add(args) => {
            let mut store = app.store::<Reference>();
            let mut dialog = EditorDialog::<Reference>::new();
            let draft = dialog.open_new();
            draft.title = args.title;
            draft.url = args.url.trim().to_string();
            draft.description = args.description;
            draft.tags = args.tags.as_deref().map(parse_tags).unwrap_or_default();
            saved_id(dialog.save(&mut store)?)
        }
        ReferenceCommand::List(args) => {
            let query = args.view_query(Reference::DEFAULT_ORDER, None)?;
            list::<Reference>(app, &args, &query, &Lookup::default(), false)
        }
        ReferenceCommand::Edit(args) => {
            let mut store = app.store::<Reference>();
            let mut dialog = open_edit(&mut store, &args.id)?;
            if let Some(draft) = dialog.draft_mut() {
                if let Some(title) = args.title {
                    draft.title = title;
                }
                if let Some(url) = args.url {
                    draft.url = url.trim().to_string();
                }
                if args.description.is_some() {
                    draft.description = args.description;
                }
                if let Some(tags) = &args.tags {
                    draft.tags = parse_tags(tags);
                }
            }
            dialog.save(&mut store)?;
            Ok(String::new())
        }
        ReferenceCommand::Delete(args) => delete::<Reference>(app, &args.id),
    }
}

fn expenses(app: &App, command: ExpenseCommand) -> Result<String> {
    match command {
        ExpenseCommand::Add(args) => {
            let index = app.expense_categories()?;
            let mut store = app.store::<Expense>();
            let mut dialog = EditorDialog::<Expense>::new();
            let draft = dialog.open_new();
            draft.amount = args.amount;
            draft.description = args.description;
            if let Some(date) = &args.date {
                draft.date = parse_date(date)?;
            }
            attach_category::<Expense, ExpenseCategory>(
                app,
                &mut dialog,
                &index,
                &args.category,
                args.create_category,
            )?;
            saved_id(dialog.save(&mut store)?)
        }
        ExpenseCommand::List(args) => {
            let index = app.expense_categories()?;
            let query = args.view_query(Expense::DEFAULT_ORDER, Some(&index))?;
            let lookup = Lookup {
                expense: Some(index),
                ..Lookup::default()
            };
            list::<Expense>(app, &args, &query, &lookup, true)
        }
        ExpenseCommand::Edit(args) => {
            let mut store = app.store::<Expense>();
            let mut dialog = open_edit(&mut store, &args.id)?;
            if let Some(draft) = dialog.draft_mut() {
                if let Some(amount) = args.amount {
                    draft.amount = amount;
                }
                if let Some(date) = &args.date {
                    draft.date = parse_date(date)?;
                }
                if args.description.is_some() {
                    draft.description = args.description;
                }
            }
            if let Some(raw) = &args.category {
                let index = app.expense_categories()?;
                attach_category::<Expense, ExpenseCategory>(
                    app,
                    &mut dialog,
                    &index,
                    raw,
                    args.create_category,
                )?;
            }
            dialog.save(&mut store)?;
            Ok(String::new())
        }
        ExpenseCommand::Delete(args) => delete::<Expense>(app, &args.id),
    }
}

fn investments(app: &App, command: InvestmentCommand) -> Result<String> {
    match command {
        InvestmentCommand::Add(args) => {
            let mut store = app.store::<Investment>();
            let mut dialog = EditorDialog::<Investment>::new();
            let draft = dialog.open_new();
            draft.symbol = normalize_symbol(&args.symbol);
            draft.shares = args.shares;
            draft.purchase_price = args.price;
            draft.notes = args.notes;
            if let Some(date) = &args.date {
                draft.purchase_date = parse_date(date)?;
            }
            saved_id(dialog.save(&mut store)?)
        }
        InvestmentCommand::List(args) => {
            let query = args.view_query(Investment::DEFAULT_ORDER, None)?;
            list::<Investment>(app, &args, &query, &Lookup::default(), false)
        }
        InvestmentCommand::Edit(args) => {
            let mut store = app.store::<Investment>();
            let mut dialog = open_edit(&mut store, &args.id)?;
            if let Some(draft) = dialog.draft_mut() {
                if let Some(symbol) = &args.symbol {
                    draft.symbol = normalize_symbol(symbol);
                }
                if let Some(shares) = args.shares {
                    draft.shares = shares;
                }
                if let Some(price) = args.price {
                    draft.purchase_price = price;
                }
                if let Some(date) = &args.date {
                    draft.purchase_date = parse_date(date)?;
                }
                if args.notes.is_some() {
                    draft.notes = args.notes;
                }
            }
            dialog.save(&mut store)?;
            Ok(String::new())
        }
        InvestmentCommand::Delete(args) => delete::<Investment>(app, &args.id),
    }
}

fn budget(app: &App, command: BudgetCommand) -> Result<String> {
    match command {
        BudgetCommand::Add(args) => {
            let index = app.expense_categories()?;
            let mut store = app.store::<BudgetItem>();
            let mut dialog = EditorDialog::<BudgetItem>::new();
            let draft = dialog.open_new();
            draft.planned_amount = args.amount;
            if let Some(month) = &args.month {
                draft.month_year = month.parse()?;
            }
            attach_category::<BudgetItem, ExpenseCategory>(
                app,
                &mut dialog,
                &index,
                &args.category,
                false,
            )?;
            saved_id(dialog.save(&mut store)?)
        }
        BudgetCommand::List(args) => {
            let index = app.expense_categories()?;
            let query = args.view_query(BudgetItem::DEFAULT_ORDER, Some(&index))?;
            let lookup = Lookup {
                expense: Some(index),
                ..Lookup::default()
            };
            list::<BudgetItem>(app, &args, &query, &lookup, false)
        }
        BudgetCommand::Edit(args) => {
            let mut store = app.store::<BudgetItem>();
            let mut dialog = open_edit(&mut store, &args.id)?;
            if let Some(draft) = dialog.draft_mut() {
                if let Some(amount) = args.amount {
                    draft.planned_amount = amount;
                }
                if let Some(month) = &args.month {
                    draft.month_year = month.parse()?;
                }
            }
            if let Some(raw) = &args.category {
                let index = app.expense_categories()?;
                attach_category::<BudgetItem, ExpenseCategory>(
                    app,
                    &mut dialog,
                    &index,
                    raw,
                    false,
                )?;
            }
            dialog.save(&mut store)?;
            Ok(String::new())
        }
        BudgetCommand::Delete(args) => delete::<BudgetItem>(app, &args.id),
    }
}

fn categories(app: &App, command: CategoryCommand) -> Result<String> {
    match command {
        CategoryCommand::Add(args) => match args.kind {
            CategoryKind::Expense => add_category::<ExpenseCategory>(app, args),
            CategoryKind::Note => add_category::<NoteCategory>(app, args),
        },
        CategoryCommand::List(args) => match args.kind {
            CategoryKind::Expense => {
                let query = args.list.view_query(ExpenseCategory::DEFAULT_ORDER, None)?;
                list::<ExpenseCategory>(app, &args.list, &query, &Lookup::default(), false)
            }
            CategoryKind::Note => {
                let query = args.list.view_query(NoteCategory::DEFAULT_ORDER, None)?;
                list::<NoteCategory>(app, &args.list, &query, &Lookup::default(), false)
            }
        },
        CategoryCommand::Edit(args) => match args.kind {
            CategoryKind::Expense => edit_category::<ExpenseCategory>(app, args),
            CategoryKind::Note => edit_category::<NoteCategory>(app, args),
        },
        CategoryCommand::Delete(args) => match args.kind {
            CategoryKind::Expense => delete::<ExpenseCategory>(app, &args.id),
            CategoryKind::Note => delete::<NoteCategory>(app, &args.id),
        },
        CategoryCommand::Icons { query } => {
            let mut table = TextTable::new(["ICON", "NAME"]);
            for icon in search_icons(&query) {
                table.row([icon.glyph().to_string(), icon.to_string()]);
            }
            if table.is_empty() {
                return Ok(format!("No icons match '{query}'.\n"));
            }
            Ok(table.render())
        }
        CategoryCommand::Colors => {
            let mut table = TextTable::new(["#", "NAME", "HEX"]);
            for (idx, (name, hex)) in ColorPalette::default().all().enumerate() {
                table.row([idx.to_string(), name.to_string(), hex.to_string()]);
            }
            Ok(table.render())
        }
    }
}

fn add_category<C>(app: &App, args: CategoryAddArgs) -> Result<String>
where
    C: Row<Draft = CategoryDraft>,
{
    let palette = ColorPalette::default();
    let mut store = app.store::<C>();
    store.fetch()?;
    let mut dialog = EditorDialog::<C>::new();
    dialog.open_new().name = args.name;
    dialog.select_color(&palette, store.len() % PALETTE.len());
    apply_category_style(&mut dialog, &palette, args.color.as_deref(), args.icon.as_deref())?;
    saved_id(dialog.save(&mut store)?)
}

fn edit_category<C>(app: &App, args: CategoryEditArgs) -> Result<String>
where
    C: Row<Draft = CategoryDraft>,
{
    let mut store = app.store::<C>();
    let mut dialog = open_edit(&mut store, &args.id)?;
    if let (Some(name), Some(draft)) = (args.name, dialog.draft_mut()) {
        draft.name = name;
    }
    apply_category_style(
        &mut dialog,
        &ColorPalette::default(),
        args.color.as_deref(),
        args.icon.as_deref(),
    )?;
    dialog.save(&mut store)?;
    Ok(String::new())
}

fn apply_category_style<C>(
    dialog: &mut EditorDialog<C>,
    palette: &ColorPalette,
    color: Option<&str>,
    icon: Option<&str>,
) -> Result<()>
where
    C: Resource<Draft = CategoryDraft>,
{
    if let Some(raw) = color {
        let Some(hex) = palette.resolve(raw) else {
            bail!("unknown color '{raw}' (see `lifeboard category colors`)");
        };
        if let Some(draft) = dialog.draft_mut() {
            draft.color = hex;
        }
    }
    if let Some(query) = icon {
        if dialog.choose_icon(query).is_none() && !query.trim().is_empty() {
            bail!("no icon matches '{query}' (see `lifeboard category icons`)");
        }
    }
    Ok(())
}

fn report(app: &App, command: ReportCommand) -> Result<String> {
    match command {
        ReportCommand::Expenses { month } => {
            let month = month_arg(month.as_deref())?;
            let index = app.expense_categories()?;
            let expenses = fetch_month::<Expense>(app, "date", month)?;
            let totals = reports::expense_totals(expenses.items(), Some(month), &index);
            if totals.is_empty() {
                return Ok(format!("No expenses in {month}.\n"));
            }
            let mut table = TextTable::new(["CATEGORY", "COUNT", "TOTAL"]);
            let mut sum = Decimal::ZERO;
            for total in &totals {
                sum += total.total;
                table.row([total.label.clone(), total.count.to_string(), money(total.total)]);
            }
            let mut out = format!("Expenses for {month}\n");
            out.push_str(&table.render());
            let _ = writeln!(out, "Total: {}", money(sum));
            Ok(out)
        }
        ReportCommand::Budget { month } => {
            let month = month_arg(month.as_deref())?;
            let index = app.expense_categories()?;
            let expenses = fetch_month::<Expense>(app, "date", month)?;
            let mut items = app
                .store::<BudgetItem>()
                .with_scope(Filter::new("month_year", FilterOp::Eq, month.to_string()));
            items.fetch()?;
            let lines = reports::budget_vs_spent(items.items(), expenses.items(), month, &index);
            if lines.is_empty() {
                return Ok(format!("No budget or spending in {month}.\n"));
            }
            let mut table = TextTable::new(["CATEGORY", "PLANNED", "SPENT", "REMAINING"]);
            for line in &lines {
                let remaining = if line.is_over() {
                    format!("{} over", money(-line.remaining()))
                } else {
                    money(line.remaining())
                };
                table.row([
                    line.label.clone(),
                    money(line.planned),
                    money(line.spent),
                    remaining,
                ]);
            }
            Ok(format!("Budget for {month}\n{}", table.render()))
        }
        ReportCommand::Portfolio => {
            let mut store = app.store::<Investment>();
            store.fetch()?;
            Ok(render_portfolio(&reports::portfolio(store.items())))
        }
        ReportCommand::Todos => {
            let mut store = app.store::<Todo>();
            store.fetch()?;
            let counts = reports::todo_counts(store.items(), OffsetDateTime::now_utc().date());
            Ok(format!(
                "{} todos: {} open, {} completed, {} overdue\n",
                counts.total, counts.open, counts.completed, counts.overdue
            ))
        }
        ReportCommand::Upcoming { days } => {
            let mut store = app.store::<CalendarEvent>();
            store.fetch()?;
            let upcoming = reports::upcoming_events(store.items(), OffsetDateTime::now_utc(), days);
            Ok(render_rows(&upcoming, &Lookup::default(), 0))
        }
    }
}

fn render_portfolio(portfolio: &reports::Portfolio) -> String {
    if portfolio.holdings.is_empty() {
        return "No investments.\n".to_string();
    }
    let mut table = TextTable::new(["SYMBOL", "SHARES", "LOTS", "AVG PRICE", "COST BASIS"]);
    for holding in &portfolio.holdings {
        table.row([
            holding.symbol.clone(),
            holding.shares.normalize().to_string(),
            holding.lots.to_string(),
            holding.average_price().map(money).unwrap_or_default(),
            money(holding.cost_basis),
        ]);
    }
    let mut out = table.render();
    let _ = writeln!(out, "Total cost basis: {}", money(portfolio.total_cost));
    out
}

fn list<R: Row>(
    app: &App,
    args: &ListArgs,
    query: &ViewQuery,
    lookup: &Lookup,
    remote_range: bool,
) -> Result<String> {
    let mut store = app.store::<R>();
    if remote_range {
        store = within(store, R::order_column(SortField::Date), query.range);
    }
    store.fetch()?;
    let rows = store.view(query);
    let limit = args.limit.unwrap_or(app.config.views.list_limit);
    Ok(render_rows(&rows, lookup, limit))
}

fn fetch_month<R: Resource>(app: &App, column: &str, month: MonthKey) -> Result<ResourceStore<R>> {
    let mut store = within(app.store::<R>(), column, RangeFilter::month(month));
    store.fetch()?;
    Ok(store)
}

/// Server-side `gte`/`lt` predicates for a half-open date range.
fn within<R: Resource>(
    mut store: ResourceStore<R>,
    column: &str,
    range: RangeFilter,
) -> ResourceStore<R> {
    if let Some(from) = range.from {
        store = store.with_scope(Filter::new(column, FilterOp::Gte, from.to_string()));
    }
    if let Some(to) = range.to {
        store = store.with_scope(Filter::new(column, FilterOp::Lt, to.to_string()));
    }
    store
}

fn delete<R: Resource>(app: &App, id: &str) -> Result<String> {
    let mut store = app.store::<R>();
    let mut dialog = open_edit(&mut store, id)?;
    dialog.delete(&mut store)?;
    Ok(String::new())
}

/// Loads the store and opens an edit dialog on the row `id` names.
fn open_edit<R: Resource>(store: &mut ResourceStore<R>, id: &str) -> Result<EditorDialog<R>> {
    store.fetch()?;
    let item = find_row(store, id)?.clone();
    let mut dialog = EditorDialog::new();
    dialog.open_edit(&item);
    Ok(dialog)
}

/// Exact id, or a prefix that identifies exactly one row.
fn find_row<'a, R: Resource>(store: &'a ResourceStore<R>, id: &str) -> Result<&'a R> {
    let id = id.trim();
    if id.is_empty() {
        bail!("row id cannot be empty");
    }
    if let Some(row) = store.get(id) {
        return Ok(row);
    }
    let matches: Vec<&R> = store
        .items()
        .iter()
        .filter(|row| row.id().starts_with(id))
        .collect();
    match matches.as_slice() {
        [row] => Ok(*row),
        [] => Err(StoreError::NotFound {
            table: R::TABLE.to_string(),
            id: id.to_string(),
        }
        .into()),
        _ => bail!("id prefix '{id}' matches {} {} rows", matches.len(), R::TABLE),
    }
}

fn resolve_category(index: &CategoryIndex, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if index.iter().any(|(id, _)| id == raw) {
        return Some(raw.to_string());
    }
    index.find_by_name(raw).map(str::to_string)
}

/// Points the dialog's draft at the named category, creating it through a
/// nested category dialog when allowed.
fn attach_category<R, C>(
    app: &App,
    dialog: &mut EditorDialog<R>,
    index: &CategoryIndex,
    raw: &str,
    create: bool,
) -> Result<()>
where
    R: Resource,
    R::Draft: CategoryField,
    C: Resource<Draft = CategoryDraft>,
{
    if let Some(id) = resolve_category(index, raw) {
        if let Some(draft) = dialog.draft_mut() {
            draft.set_category(&id);
        }
        return Ok(());
    }
    if !create {
        bail!("unknown category '{}' (pass --create-category to add it)", raw.trim());
    }
    let mut categories = app.store::<C>();
    let mut nested = EditorDialog::<C>::new();
    nested.open_new().name = raw.trim().to_string();
    nested.select_color(&ColorPalette::default(), index.len() % PALETTE.len());
    dialog.create_category(&mut nested, &mut categories)?;
    Ok(())
}

fn saved_id<R: Resource>(saved: Option<R>) -> Result<String> {
    match saved {
        Some(row) => Ok(format!("{}\n", row.id())),
        None => bail!("nothing to save"),
    }
}

fn month_arg(raw: Option<&str>) -> Result<MonthKey> {
    match raw {
        Some(raw) => raw.parse(),
        None => Ok(MonthKey::current()),
    }
}

fn parse_date(raw: &str) -> Result<Date> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("today") {
        return Ok(OffsetDateTime::now_utc().date());
    }
    Date::parse(raw, &*DATE_FORMAT).with_context(|| format!("'{raw}' is not a YYYY-MM-DD date"))
}

/// RFC 3339, `YYYY-MM-DD HH:MM` in UTC, or a bare date at midnight UTC.
fn parse_datetime(raw: &str) -> Result<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(at);
    }
    let spaced = raw.replacen('T', " ", 1);
    if let Ok(at) = PrimitiveDateTime::parse(&spaced, &*MINUTE_FORMAT) {
        return Ok(at.assume_utc());
    }
    let date = parse_date(raw)
        .with_context(|| format!("'{raw}' is not a timestamp (try \"2024-05-01 14:30\")"))?;
    Ok(date.midnight().assume_utc())
}

/// `Some("-")` reads the value from piped stdin.
fn body_arg(raw: Option<String>) -> Result<Option<String>> {
    match raw.as_deref() {
        Some("-") => match read_stdin()? {
            Some(body) => Ok(Some(body)),
            None => bail!("'-' reads the body from stdin, but stdin is a terminal"),
        },
        _ => Ok(raw),
    }
}

fn read_password() -> Result<String> {
    match read_stdin_line()? {
        Some(line) => Ok(line),
        None => prompt("Password"),
    }
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

fn read_stdin_line() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(Some(line.trim_end().to_owned()))
}
