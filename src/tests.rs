#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use crate::core::nodes::Resolution;
    use crate::{
        Document, DumpOptions, Dumper, FileSystem, Macro, MacroContext, Map, Nacl, NaclError, ParamType, Value,
    };

    fn init() {
        let _ = env_logger::builder().is_test(true).filter_level(log::LevelFilter::Trace).try_init();
    }

    fn fixture(path: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(path)
    }

    fn fixtures(pattern: &str) -> Vec<PathBuf> {
        let pattern = fixture(pattern);
        let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .expect("valid fixture pattern")
            .filter_map(|entry| entry.ok())
            .collect();
        files.sort();
        assert!(!files.is_empty(), "no fixture matches {}", pattern.display());
        files
    }

    fn read_json(path: &Path) -> Value {
        let content = std::fs::read_to_string(path).expect("readable fixture");
        let json: serde_json::Value = serde_json::from_str(&content).expect("valid json fixture");
        Value::from(json)
    }

    fn nacl_with_strtoupper() -> Nacl {
        let nacl = Nacl::with_registry(Arc::new(crate::MacroRegistry::with_builtins()));
        nacl.register_fn("strtoupper", |parameter, _| {
            Ok(Value::String(parameter.as_str().unwrap_or_default().to_uppercase()))
        })
        .unwrap();
        nacl
    }

    /// Files kept in memory, keyed by absolute path.
    #[derive(Debug, Default)]
    struct MemoryFileSystem {
        files: HashMap<PathBuf, String>,
    }

    impl MemoryFileSystem {
        fn with(mut self, path: &str, content: &str) -> Self {
            self.files.insert(PathBuf::from(path), content.to_string());
            self
        }
    }

    impl FileSystem for MemoryFileSystem {
        fn read(&self, path: &Path) -> io::Result<String> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }

        fn resolve_path(&self, relative: &str, base_dir: &Path) -> Option<PathBuf> {
            let path = base_dir.join(relative);
            self.files.contains_key(&path).then_some(path)
        }

        fn glob(&self, pattern: &str, base_dir: &Path) -> Vec<PathBuf> {
            let Ok(pattern) = glob::Pattern::new(&base_dir.join(pattern).to_string_lossy()) else {
                return Vec::new();
            };
            let mut files: Vec<PathBuf> = self.files.keys().filter(|path| pattern.matches_path(path)).cloned().collect();
            files.sort();
            files
        }

        fn exists(&self, path: &Path) -> bool {
            self.files.keys().any(|file| file.starts_with(path))
        }

        fn is_file(&self, path: &Path) -> bool {
            self.files.contains_key(path)
        }
    }

    fn memory_nacl(file_system: MemoryFileSystem) -> Nacl {
        let mut nacl = Nacl::new();
        nacl.set_file_system(Arc::new(file_system)).set_base_dir("/etc/app");
        nacl
    }

    /// Counts its invocations and returns its parameter.
    struct CountingMacro {
        calls: Arc<AtomicUsize>,
    }

    impl Macro for CountingMacro {
        fn execute(&self, parameter: Value, _options: &Map, _context: &MacroContext) -> crate::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(parameter)
        }
    }

    fn counting_nacl() -> (Nacl, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let nacl = Nacl::with_registry(Arc::new(crate::MacroRegistry::new()));
        nacl.register_macro("count", Arc::new(CountingMacro { calls: calls.clone() }))
            .unwrap();
        (nacl, calls)
    }

    #[test]
    fn test_nacl_fixtures() {
        init();
        for conf in fixtures("nacl/*.conf") {
            let mut nacl = Nacl::with_registry(Arc::new(crate::MacroRegistry::with_builtins()));
            nacl.register_fn("testMacro", |parameter, _| Ok(parameter)).unwrap();
            nacl.register_fn("testMacroWithOptions", |parameter, options| {
                let mut result = Map::new();
                result.insert("param".to_string(), parameter);
                result.insert("options".to_string(), Value::Map(options.clone()));
                Ok(Value::Map(result))
            })
            .unwrap();
            nacl.set_variable("BAR", "bar").set_variable("MY_VAR", "my var value");

            let expected = read_json(&conf.with_extension("json"));
            let actual = nacl
                .parse_file(&conf)
                .unwrap_or_else(|err| panic!("{}: {}", conf.display(), err));
            assert_eq!(actual, expected, "{}", conf.display());
        }
    }

    #[test]
    fn test_json_is_valid_nacl() {
        init();
        for file in fixtures("json/*.json") {
            let actual = crate::parse_file(&file).unwrap_or_else(|err| panic!("{}: {}", file.display(), err));
            assert_eq!(actual, read_json(&file), "{}", file.display());
        }
    }

    #[test]
    fn test_dump_round_trip() {
        init();
        for file in fixtures("json/*.json") {
            let value = read_json(&file);
            for options in DumpOptions::all() {
                let source = Dumper::new(options).dump(&value);
                let parsed = crate::parse(&source)
                    .unwrap_or_else(|err| panic!("{} with {:?}: {}\n{}", file.display(), options, err, source));
                assert_eq!(parsed, value, "{} with {:?}\n{}", file.display(), options, source);
            }
        }
    }

    #[test]
    fn test_bare_values_nest() {
        init();
        let value = crate::parse("a b c").unwrap();
        assert_eq!(serde_json::Value::from(value), json!({"a": {"b": "c"}}));
    }

    #[test]
    fn test_operator_precedence() {
        init();
        assert_eq!(crate::parse("1 + 2 * 3").unwrap(), Value::from(7));
        assert_eq!(crate::parse("2 ^ 3 ^ 2").unwrap(), Value::from(512));
    }

    #[test]
    fn test_root_scalars() {
        init();
        assert_eq!(crate::parse("hello").unwrap(), Value::from("hello"));
        assert_eq!(crate::parse("\"hello\";").unwrap(), Value::from("hello"));
        assert_eq!(crate::parse("true").unwrap(), Value::Boolean(true));
        assert_eq!(crate::parse("").unwrap(), Value::Map(Map::new()));
    }

    #[test]
    fn test_registered_macro() {
        init();
        let nacl = nacl_with_strtoupper();
        assert_eq!(serde_json::Value::from(nacl.parse("foo .strtoupper bar").unwrap()), json!({"foo": "BAR"}));
        assert_eq!(
            serde_json::Value::from(nacl.parse("${BAR} = .strtoupper bar; foo ${BAR};").unwrap()),
            json!({"foo": "BAR"})
        );
    }

    #[test]
    fn test_duplicate_macro_registration() {
        init();
        let nacl = nacl_with_strtoupper();
        let err = nacl.register_fn("strtoupper", |parameter, _| Ok(parameter)).unwrap_err();
        assert_eq!(err, NaclError::DuplicateMacro("strtoupper".to_string()));

        assert!(matches!(nacl.register_fn("env", |p, _| Ok(p)), Err(NaclError::DuplicateMacro(_))));
        assert!(matches!(nacl.register_fn("ref", |p, _| Ok(p)), Err(NaclError::DuplicateMacro(_))));
        assert!(!nacl.registry().contains("ref"));
        assert!(nacl.registry().contains("strtoupper"));
        assert_eq!(nacl.registry().names(), ["env", "file", "strtoupper"]);
    }

    #[test]
    fn test_unused_macro_is_never_executed() {
        init();
        let nacl = Nacl::new();
        nacl.register_fn("error", |parameter, _| {
            Err(NaclError::Macro(parameter.as_str().unwrap_or_default().to_string()))
        })
        .unwrap();
        let value = nacl.parse("foo .error \"FAIL\"; foo bar;").unwrap();
        assert_eq!(serde_json::Value::from(value), json!({"foo": "bar"}));
    }

    #[test]
    fn test_macro_runs_once_through_variables_and_references() {
        init();
        let (nacl, calls) = counting_nacl();
        let value = nacl
            .parse("${V} = .count x; a ${V}; b ${V}; c .ref \"a\"; d .ref \"/c\";")
            .unwrap();
        assert_eq!(serde_json::Value::from(value), json!({"a": "x", "b": "x", "c": "x", "d": "x"}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_macro_is_memoized() {
        init();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let nacl = Nacl::with_registry(Arc::new(crate::MacroRegistry::new()));
        nacl.register_fn("fail", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(NaclError::Macro("boom".to_string()))
        })
        .unwrap();

        let mut document = nacl.create_parser().parse("a .fail x;", "test").unwrap();
        let first = document.resolve().unwrap_err();
        let second = document.resolve().unwrap_err();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_macro_parameter_type_is_validated() {
        init();
        let err = crate::parse("foo .env [1]").unwrap_err();
        assert_eq!(err.message(), "Macro 'env' expects parameter to be string, array given.");
    }

    #[test]
    fn test_unknown_macro() {
        init();
        let err = crate::parse("foo .nope 1").unwrap_err();
        assert!(matches!(err, NaclError::Parsing { .. }));
        assert_eq!(err.message(), "Unknown macro 'nope'");
    }

    #[test]
    fn test_circular_reference() {
        init();
        let err = crate::parse("foo .ref \"./bar\"; bar .ref \"foo\"").unwrap_err();
        assert!(matches!(err, NaclError::Reference { .. }));
        assert_eq!(err.message(), "Circular dependence detected.");
    }

    #[test]
    fn test_failed_reference_is_memoized() {
        init();
        let mut document = crate::Parser::default().parse("foo .ref \"bar\";", "test").unwrap();
        let first = document.resolve().unwrap_err();
        assert_eq!(first.message(), "Undefined property: bar.");

        let failed = (0..document.len()).any(|id| match document.node(id).kind() {
            crate::core::nodes::NodeKind::Reference(reference) => matches!(reference.state(), Resolution::Failed(_)),
            _ => false,
        });
        assert!(failed);
        assert_eq!(document.resolve().unwrap_err(), first);
    }

    #[test]
    fn test_reference_defaults_and_errors() {
        init();
        let value = crate::parse("foo .ref (default: bar) \"/app/foo\"").unwrap();
        assert_eq!(serde_json::Value::from(value), json!({"foo": "bar"}));

        let err = crate::parse("ref .ref {}").unwrap_err();
        assert_eq!(err.message(), ".ref expects parameter to be string, object given.");
    }

    #[test]
    fn test_reference_into_macro_result() {
        init();
        let nacl = Nacl::new();
        nacl.register_fn("obj", |_, _| Ok(Value::from(json!({"inner": {"x": 1}}))))
            .unwrap();
        let value = nacl.parse("data .obj null; x .ref \"data/inner/x\";").unwrap();
        assert_eq!(value.get("x"), Some(&Value::from(1)));
    }

    #[test]
    fn test_keyless_reference_merges_referenced_object() {
        init();
        let value = crate::parse("a { x 1 } c { z 3; .ref \"../a\" } b { .ref \"/a\"; y 2; .ref \"/c\" }").unwrap();
        assert_eq!(
            serde_json::Value::from(value),
            json!({"a": {"x": 1}, "b": {"x": 1, "y": 2, "z": 3}, "c": {"z": 3, "x": 1}})
        );

        let err = crate::parse(".ref \"/a\"").unwrap_err();
        assert!(matches!(err, NaclError::Reference { .. }));
        assert_eq!(err.message(), "Undefined property: /a.");
    }

    #[test]
    fn test_copied_variables_keep_their_own_references() {
        init();
        let value = crate::parse("${V} = { x 1; y .ref \"x\" }; a ${V}; b ${V}; b x 2;").unwrap();
        assert_eq!(
            serde_json::Value::from(value),
            json!({"a": {"x": 1, "y": 1}, "b": {"x": 2, "y": 2}})
        );

        let value = crate::parse("${X} = .ref \"x\"; ${V} = { x 1; y \"<${X}>\" }; a ${V}; b ${V}; b x 2;").unwrap();
        assert_eq!(
            serde_json::Value::from(value),
            json!({"a": {"x": 1, "y": "<1>"}, "b": {"x": 2, "y": "<2>"}})
        );
    }

    #[test]
    fn test_long_operation_chains() {
        init();
        let (nacl, calls) = counting_nacl();
        let source = format!("${{X}} = .count a; ${{S}} = \"{}\"; s ${{S}}; t ${{S}};", "${X}".repeat(5000));
        let value = nacl.parse(&source).unwrap();
        assert_eq!(value.get("s"), Some(&Value::from("a".repeat(5000))));
        assert_eq!(value.get("t"), value.get("s"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let sum = vec!["${N}"; 5000].join(" + ");
        let value = nacl.parse(&format!("${{N}} = .count 1; n {}; ${{M}} = {}; m ${{M}};", sum, sum)).unwrap();
        assert_eq!(value.get("n"), Some(&Value::from(5000)));
        assert_eq!(value.get("m"), Some(&Value::from(5000)));
    }

    #[test]
    fn test_lexing_errors() {
        init();
        let cases = [
            ("foo=\"bar", "Unterminated string"),
            ("/*", "Unterminated multiline comment"),
            ("foo=<<<TEST\n", "Unterminated HEREDOC"),
        ];
        for (source, message) in cases {
            let err = crate::parse(source).unwrap_err();
            assert!(matches!(err, NaclError::Lexing { .. }), "{}", source);
            assert_eq!(err.message(), message);
        }
    }

    #[test]
    fn test_syntax_error_messages() {
        init();
        let err = crate::parse("foo bar baz {}10;").unwrap_err();
        assert!(err.message().contains("Syntax error, unexpected '10' (T_NUM)"), "{}", err);

        let err = crate::parse("+;").unwrap_err();
        assert!(err.message().contains("Syntax error, unexpected ';'"), "{}", err);
        assert_eq!(err.to_string(), "Syntax error, unexpected ';' in nacl string on line 1");
    }

    #[test]
    fn test_keyless_macro_must_return_object() {
        init();
        let err = crate::parse("foo bar; .env unexistingenv").unwrap_err();
        assert_eq!(err.message(), "Macro without assignation key must return an object.");

        let err = crate::parse(".env unexistingenv; foo bar").unwrap_err();
        assert!(err.message().contains("Syntax error, unexpected 'foo' (T_NAME)"), "{}", err);
    }

    #[test]
    fn test_error_location_follows_lines() {
        init();
        let err = Nacl::new().parse_named("a 1;\nb 2;\nc .ref \"nope\";", "app.conf").unwrap_err();
        let location = err.location().unwrap();
        assert_eq!((location.file.as_str(), location.line), ("app.conf", 3));
    }

    #[test]
    fn test_undefined_variable_is_a_warning() {
        init();
        let mut document = crate::Parser::default().parse("foo \"a${NOPE}b\";", "test").unwrap();
        assert_eq!(serde_json::Value::from(document.resolve().unwrap()), json!({"foo": "ab"}));
        assert_eq!(document.warnings().len(), 1);
        assert_eq!(document.warnings()[0].message, "Undefined variable NOPE");
    }

    #[test]
    fn test_predefined_variables() {
        init();
        let mut nacl = Nacl::new();
        nacl.set_variable("NAME", "demo")
            .set_variable("LIMITS", Value::from(json!({"cpu": 2})));
        let value = nacl.parse("name ${NAME}; a ${LIMITS}; b ${LIMITS}; b mem 4;").unwrap();
        assert_eq!(
            serde_json::Value::from(value),
            json!({"name": "demo", "a": {"cpu": 2}, "b": {"cpu": 2, "mem": 4}})
        );
    }

    #[test]
    fn test_lazy_operations() {
        init();
        let (nacl, calls) = counting_nacl();
        let value = nacl.parse("${N} = .count 2; a ${N} * 3 + 1; b \"n=${N}\"; c -${N};").unwrap();
        assert_eq!(
            serde_json::Value::from(value),
            json!({"a": 7, "b": "n=2", "c": -2})
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = nacl.parse("${N} = .count 1; a ${N} / 0;").unwrap_err();
        assert!(matches!(err, NaclError::Evaluation { .. }));
        assert_eq!(err.message(), "Division by zero");
    }

    #[test]
    fn test_merge_is_idempotent_and_deep() {
        init();
        let mut document = Document::new();
        let value = Value::from(json!({"a": 1, "b": "two", "c": null}));
        let Value::Map(map) = value.clone() else { unreachable!() };
        let object = document.object_from_map(map);
        let merged = document.merge(object, object);
        assert_eq!(document.resolve_node(merged).unwrap(), value);

        let value = crate::parse("a { x 1 } a { y 2 }").unwrap();
        assert_eq!(serde_json::Value::from(value), json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn test_include_with_memory_file_system() {
        init();
        let file_system = MemoryFileSystem::default()
            .with("/etc/app/main.conf", ".include \"conf.d/base.conf\"; server port 9000;")
            .with("/etc/app/conf.d/base.conf", "server { host localhost; port 80; } name ${__DIR__};")
            .with("/etc/app/conf.d/b.conf", "b true;")
            .with("/etc/app/conf.d/a.conf", "a true;");
        let nacl = memory_nacl(file_system);

        let value = nacl.parse_file("/etc/app/main.conf").unwrap();
        assert_eq!(
            serde_json::Value::from(value),
            json!({"server": {"host": "localhost", "port": 9000}, "name": "/etc/app/conf.d"})
        );

        let value = nacl.parse(".include (glob: true) \"conf.d/[ab].conf\";").unwrap();
        let keys: Vec<&String> = value.as_map().unwrap().keys().collect();
        assert_eq!(keys, ["a", "b"]);

        let value = nacl.parse("all .include (glob: true, filenameKey: true) \"conf.d/*.conf\";").unwrap();
        let keys: Vec<&String> = value.get("all").and_then(Value::as_map).unwrap().keys().collect();
        assert_eq!(keys, ["a", "b", "base"]);
    }

    #[test]
    fn test_missing_includes() {
        init();
        let nacl = memory_nacl(MemoryFileSystem::default());

        let err = nacl.parse(".include \"missing.conf\"").unwrap_err();
        assert_eq!(err.message(), "Unable to include file 'missing.conf'");

        let err = nacl.parse(".include (glob: true) \"*.conf\"").unwrap_err();
        assert_eq!(err.message(), "Unable to include file '*.conf'");

        let value = nacl.parse("x .include (required: false) \"missing.conf\"").unwrap();
        assert_eq!(serde_json::Value::from(value), json!({"x": {}}));
    }

    #[test]
    fn test_recursive_include_hits_depth_limit() {
        init();
        let file_system = MemoryFileSystem::default().with("/etc/app/loop.conf", ".include \"loop.conf\"");
        let mut nacl = memory_nacl(file_system);
        nacl.set_max_depth(16);
        let err = nacl.parse_file("/etc/app/loop.conf").unwrap_err();
        assert_eq!(err.message(), "Maximum nesting depth of 16 exceeded");
    }

    #[test]
    fn test_file_macro() {
        init();
        let file_system = MemoryFileSystem::default().with("/etc/app/motd.txt", "welcome");
        let nacl = memory_nacl(file_system);

        let value = nacl.parse("motd .file \"motd.txt\"").unwrap();
        assert_eq!(value.get("motd"), Some(&Value::from("welcome")));

        let err = nacl.parse("foo .file \"unknown.txt\"").unwrap_err();
        assert_eq!(err.message(), "Unable to read file 'unknown.txt'");

        let value = nacl.parse("foo .file (default: bar) \"unknown.txt\"").unwrap();
        assert_eq!(value.get("foo"), Some(&Value::from("bar")));
    }

    #[test]
    fn test_env_macro() {
        init();
        let path = std::env::var("PATH").unwrap_or_default();
        let value = crate::parse("path .env PATH; missing .env NACL_TEST_UNSET; fallback .env (default: 8) NACL_TEST_UNSET;")
            .unwrap();
        assert_eq!(value.get("missing"), Some(&Value::Boolean(false)));
        assert_eq!(value.get("fallback"), Some(&Value::from(8)));
        if std::env::var("PATH").is_ok() {
            assert_eq!(value.get("path"), Some(&Value::from(path.as_str())));

            let err = crate::parse("x .env (type: list) PATH").unwrap_err();
            assert_eq!(err.message(), "Invalid type for .env macro: 'list'");
        }
    }

    #[test]
    fn test_parse_file_argument_errors() {
        init();
        assert!(matches!(crate::parse_file("error"), Err(NaclError::FileNotFound(_))));
        assert!(matches!(crate::parse_file(fixture("nacl")), Err(NaclError::NotAFile(_))));
    }

    #[test]
    fn test_callback_parameter_type() {
        init();
        let nacl = Nacl::new();
        nacl.register_macro(
            "double",
            Arc::new(
                crate::CallbackMacro::new(|parameter, _| {
                    let n = match parameter {
                        Value::Number(number) => number.truncate(),
                        _ => 0,
                    };
                    Ok(Value::from(n * 2))
                })
                .with_parameter_type(ParamType::Number),
            ),
        )
        .unwrap();
        assert_eq!(nacl.parse("x .double 21").unwrap().get("x"), Some(&Value::from(42)));
        let err = nacl.parse("x .double abc").unwrap_err();
        assert_eq!(err.message(), "Macro 'double' expects parameter to be number, string given.");
    }
}
