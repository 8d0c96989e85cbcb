use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, Ident, ItemFn, Pat, PathArguments,
    Signature, Type,
};

/// Run an async ballotd test against its own throwaway election database.
///
/// Parameters are filled by type, in any order:
/// - `Client`: an untracked local client for the full API,
/// - `Database`: the test database,
/// - `Store`: the client and database bundle the voting core works on,
/// - `Coll<T>`: any number of typed collections.
///
/// The database is dropped once the test finishes, whether or not it passed.
#[proc_macro_attribute]
pub fn backend_test(_args: TokenStream, input: TokenStream) -> TokenStream {
    let mut test_fn = parse_macro_input!(input as ItemFn);

    let fixtures = match fixtures_of(&test_fn.sig) {
        Ok(fixtures) => fixtures,
        Err(err) => return err.into_compile_error().into(),
    };
    let args: Vec<TokenStream2> = fixtures.iter().map(Fixture::arg).collect();
    let collections: Vec<TokenStream2> = fixtures.iter().filter_map(Fixture::binding).collect();

    // The generated `#[test]` takes the original name; the body becomes an
    // inner async fn.
    let name = test_fn.sig.ident.clone();
    let body_name = format_ident!("{}_body", name);
    test_fn.sig.ident = body_name.clone();

    quote! {
        #[test]
        fn #name() {
            async fn connect() -> (rocket::local::asynchronous::Client, mongodb::Client, mongodb::Database) {
                log4rs_test_utils::test_logging::init_logging_once_for(["ballotd"], None, None);
                let db_client = crate::db_client().await;
                let db_name = crate::database();
                let rocket = crate::rocket_for_db(db_client.clone(), &db_name).await;
                let rocket_client = rocket::local::asynchronous::Client::untracked(rocket)
                    .await
                    .expect("local ballotd client");
                let db = db_client.database(&db_name);
                (rocket_client, db_client, db)
            }

            #test_fn

            async fn drop_database(db: mongodb::Database) {
                db.drop(None).await.expect("drop test election database");
            }

            // Connecting and dropping must not share the runtime the test
            // body may poison by panicking.
            let harness = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("ballotd-test-harness")
                .worker_threads(1)
                .enable_all()
                .build()
                .expect("harness runtime");
            let body_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("ballotd-test-body")
                .worker_threads(1)
                .enable_all()
                .build()
                .expect("test body runtime");

            let (rocket_client, db_client, db) = harness.block_on(connect());

            // Mutexes carry the `!UnwindSafe` handles into `catch_unwind`.
            let handles = std::sync::Mutex::new((rocket_client, db_client, db.clone(), body_runtime));
            let outcome = std::panic::catch_unwind(|| {
                let (rocket_client, db_client, db, body_runtime) = handles.into_inner().unwrap();
                let store = crate::voting::Store::new(db_client, db.clone());
                #(#collections)*
                body_runtime.block_on(#body_name(#(#args),*));
            });

            harness.block_on(drop_database(db));

            if let Err(panic) = outcome {
                std::panic::resume_unwind(panic);
            }
        }
    }
    .into()
}

/// A value the harness can hand to a test parameter.
enum Fixture {
    Client,
    Database,
    Store,
    Collection { ident: Ident, document: Ident },
}

impl Fixture {
    fn arg(&self) -> TokenStream2 {
        match self {
            Self::Client => quote! { rocket_client },
            Self::Database => quote! { db.clone() },
            Self::Store => quote! { store.clone() },
            Self::Collection { ident, .. } => quote! { #ident },
        }
    }

    fn binding(&self) -> Option<TokenStream2> {
        match self {
            Self::Collection { ident, document } => Some(quote! {
                let #ident = crate::model::mongodb::Coll::<#document>::from_db(&db);
            }),
            _ => None,
        }
    }

    /// Only collections may be requested more than once.
    fn singleton_name(&self) -> Option<&'static str> {
        match self {
            Self::Client => Some("Client"),
            Self::Database => Some("Database"),
            Self::Store => Some("Store"),
            Self::Collection { .. } => None,
        }
    }
}

fn fixtures_of(sig: &Signature) -> Result<Vec<Fixture>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(
            sig.span(),
            "ballotd backend tests must be `async fn`",
        ));
    }

    let mut fixtures: Vec<Fixture> = Vec::with_capacity(sig.inputs.len());
    for input in &sig.inputs {
        let fixture = fixture_for(input).ok_or_else(|| {
            syn::Error::new(
                input.span(),
                "backend test parameters must be typed `Client`, `Database`, `Store` or `Coll<Document>`",
            )
        })?;
        if let Some(name) = fixture.singleton_name() {
            if fixtures.iter().any(|seen| seen.singleton_name() == Some(name)) {
                return Err(syn::Error::new(
                    input.span(),
                    format!("a backend test gets a single `{name}`"),
                ));
            }
        }
        fixtures.push(fixture);
    }
    Ok(fixtures)
}

fn fixture_for(input: &FnArg) -> Option<Fixture> {
    let FnArg::Typed(pat_type) = input else {
        return None;
    };
    let Pat::Ident(pat_ident) = &*pat_type.pat else {
        return None;
    };
    let Type::Path(type_path) = &*pat_type.ty else {
        return None;
    };

    if let Some(type_ident) = type_path.path.get_ident() {
        return match type_ident.to_string().as_str() {
            "Client" => Some(Fixture::Client),
            "Database" => Some(Fixture::Database),
            "Store" => Some(Fixture::Store),
            _ => None,
        };
    }

    // `Coll<T>`, possibly written with a module path.
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Coll" {
        return None;
    }
    let PathArguments::AngleBracketed(generics) = &segment.arguments else {
        return None;
    };
    let Some(GenericArgument::Type(Type::Path(document))) = generics.args.first() else {
        return None;
    };
    Some(Fixture::Collection {
        ident: pat_ident.ident.clone(),
        document: document.path.get_ident()?.clone(),
    })
}
