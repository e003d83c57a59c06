use super::*;

#[test]
fn query_pairs_split_on_first_equals() {
    assert_eq!(parse_query_pair("status=open").unwrap(), ("status", "open"));
    assert_eq!(parse_query_pair(" due = a=b").unwrap(), ("due", " a=b"));
    assert!(parse_query_pair("=x").is_err());
    assert!(parse_query_pair("novalue").is_err());
}

#[test]
fn cli_parses_login_flags() {
    let cli = Cli::try_parse_from(["muhasabah", "login", "aisha", "--password", "correct-horse", "--remember"]).unwrap();
    let Command::Login(args) = cli.command else {
        panic!("expected login");
    };
    assert_eq!(args.identifier, "aisha");
    assert!(args.remember);
}

#[test]
fn input_errors_name_their_fields() {
    let err = CliError::from(AuthError::InvalidInput(vec![muhasabah_client::auth::InputError::Password]));
    assert_eq!(err.to_string(), "password: Password must be at least 8 characters");
}

#[test]
fn api_errors_render_user_message() {
    let err = CliError::from(ApiError::RateLimited { retry_after_secs: 9 });
    assert_eq!(err.to_string(), "Too many attempts. Try again in 9s.");
}

#[test]
fn cli_parses_register_role() {
    let cli = Cli::try_parse_from([
        "muhasabah", "register", "aisha@example.com", "aisha", "--role", "sitting_head", "--password", "correct-horse",
    ])
    .unwrap();
    let Command::Register(args) = cli.command else {
        panic!("expected register");
    };
    assert_eq!(args.role, Role::SittingHead);
    assert_eq!(args.location, None);
}

#[test]
fn unknown_role_is_rejected() {
    assert!(Cli::try_parse_from(["muhasabah", "register", "a@b.c", "abc", "--role", "janitor", "--password", "xxxxxxxx"]).is_err());
}

#[test]
fn cli_parses_confirm_reset() {
    let cli = Cli::try_parse_from(["muhasabah", "confirm-reset", "MTI", "tok", "--password", "new password"]).unwrap();
    let Command::ConfirmReset(args) = cli.command else {
        panic!("expected confirm-reset");
    };
    assert_eq!((args.uid.as_str(), args.token.as_str()), ("MTI", "tok"));
}
