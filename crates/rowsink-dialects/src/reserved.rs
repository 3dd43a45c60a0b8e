//! Reserved-word tables driving identifier quoting
//!
//! Membership is checked case-insensitively. The lists hold the words that
//! actually collide with column/table names in practice; exotic reserved
//! words that are also invalid identifiers never reach the check.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Words reserved by every supported SQL dialect
const ANSI: &[&str] = &[
    "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHECK", "COLUMN", "CONSTRAINT",
    "CREATE", "CROSS", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DEFAULT", "DELETE",
    "DESC", "DISTINCT", "DROP", "ELSE", "END", "EXISTS", "FOREIGN", "FROM", "FULL", "GRANT",
    "GROUP", "HAVING", "IN", "INDEX", "INNER", "INSERT", "INTO", "IS", "JOIN", "KEY", "LEFT",
    "LIKE", "NOT", "NULL", "ON", "OR", "ORDER", "OUTER", "PRIMARY", "REFERENCES", "RIGHT",
    "SELECT", "SET", "TABLE", "THEN", "TO", "UNION", "UNIQUE", "UPDATE", "VALUES", "WHEN",
    "WHERE", "WITH",
];

fn build(extra: &[&'static str]) -> HashSet<&'static str> {
    ANSI.iter().chain(extra.iter()).copied().collect()
}

pub static ORACLE: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    build(&[
        "ACCESS", "AUDIT", "CLUSTER", "COMMENT", "COMPRESS", "CONNECT", "DATE", "EXCLUSIVE",
        "FILE", "IDENTIFIED", "IMMEDIATE", "INCREMENT", "INITIAL", "INTERSECT", "LEVEL", "LOCK",
        "LONG", "MAXEXTENTS", "MINUS", "MODE", "NOAUDIT", "NOCOMPRESS", "NOWAIT", "NUMBER",
        "OFFLINE", "ONLINE", "PCTFREE", "PRIOR", "PUBLIC", "RAW", "RENAME", "RESOURCE", "ROW",
        "ROWID", "ROWNUM", "ROWS", "SESSION", "SHARE", "SIZE", "START", "SUCCESSFUL", "SYNONYM",
        "SYSDATE", "TRIGGER", "UID", "USER", "VALIDATE", "VARCHAR2", "VIEW", "WHENEVER",
    ])
});

pub static MYSQL: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    build(&[
        "ACCESSIBLE", "ANALYZE", "BEFORE", "BIGINT", "BINARY", "BLOB", "BOTH", "CALL", "CASCADE",
        "CHANGE", "CHAR", "CONDITION", "CONTINUE", "CONVERT", "CURSOR", "DATABASE", "DATABASES",
        "DECIMAL", "DECLARE", "DELAYED", "DESCRIBE", "DIV", "DOUBLE", "DUAL", "EACH", "ENCLOSED",
        "ESCAPED", "EXIT", "EXPLAIN", "FLOAT", "FORCE", "GROUPS", "HIGH_PRIORITY", "IF", "IGNORE",
        "INFILE", "INT", "INTERVAL", "ITERATE", "KEYS", "KILL", "LEADING", "LEAVE", "LIMIT",
        "LINES", "LOAD", "LOCALTIME", "LOCALTIMESTAMP", "LOCK", "LONG", "LONGBLOB", "LONGTEXT",
        "LOOP", "LOW_PRIORITY", "MATCH", "MEDIUMBLOB", "MEDIUMINT", "MEDIUMTEXT", "MOD",
        "NATURAL", "NO_WRITE_TO_BINLOG", "NUMERIC", "OPTIMIZE", "OPTION", "OPTIONALLY", "OUT",
        "OUTFILE", "PARTITION", "PRECISION", "PROCEDURE", "PURGE", "RANGE", "RANK", "READ",
        "REAL", "REGEXP", "RELEASE", "REPEAT", "REPLACE", "REQUIRE", "RESTRICT", "RETURN",
        "REVOKE", "RLIKE", "ROW_NUMBER", "SCHEMA", "SCHEMAS", "SEPARATOR", "SHOW", "SMALLINT",
        "SPATIAL", "SQL", "SSL", "STARTING", "STRAIGHT_JOIN", "TERMINATED", "TINYBLOB",
        "TINYINT", "TINYTEXT", "TRAILING", "TRIGGER", "UNDO", "UNLOCK", "UNSIGNED", "USAGE",
        "USE", "USING", "VARBINARY", "VARCHAR", "WHILE", "WINDOW", "WRITE", "XOR", "ZEROFILL",
    ])
});

pub static POSTGRES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    build(&[
        "ANALYSE", "ANALYZE", "ARRAY", "ASYMMETRIC", "AUTHORIZATION", "BINARY", "BOTH", "CAST",
        "COLLATE", "CONCURRENTLY", "CURRENT_CATALOG", "CURRENT_ROLE", "CURRENT_SCHEMA",
        "CURRENT_USER", "DEFERRABLE", "DO", "EXCEPT", "FETCH", "FOR", "FREEZE", "ILIKE",
        "INITIALLY", "INTERSECT", "ISNULL", "LATERAL", "LEADING", "LIMIT", "LOCALTIME",
        "LOCALTIMESTAMP", "NATURAL", "NOTNULL", "OFFSET", "ONLY", "OVERLAPS", "PLACING",
        "RETURNING", "SESSION_USER", "SIMILAR", "SYMMETRIC", "TABLESAMPLE", "TRAILING", "USER",
        "USING", "VARIADIC", "VERBOSE", "WINDOW",
    ])
});

pub static SQLITE: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    build(&[
        "ABORT", "ACTION", "AFTER", "ANALYZE", "ATTACH", "AUTOINCREMENT", "BEFORE", "BEGIN",
        "CASCADE", "CAST", "COLLATE", "COMMIT", "CONFLICT", "DATABASE", "DEFERRABLE", "DEFERRED",
        "DETACH", "EACH", "ESCAPE", "EXCEPT", "EXCLUSIVE", "EXPLAIN", "FAIL", "FOR", "GLOB",
        "IF", "IGNORE", "IMMEDIATE", "INDEXED", "INITIALLY", "INSTEAD", "INTERSECT", "ISNULL",
        "LIMIT", "MATCH", "NATURAL", "NO", "NOTNULL", "OF", "OFFSET", "PLAN", "PRAGMA", "QUERY",
        "RAISE", "RECURSIVE", "REGEXP", "REINDEX", "RELEASE", "RENAME", "REPLACE", "RESTRICT",
        "ROLLBACK", "ROW", "SAVEPOINT", "TEMP", "TEMPORARY", "TRANSACTION", "TRIGGER", "VACUUM",
        "VIEW", "VIRTUAL", "WITHOUT",
    ])
});

pub static DERBY: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    build(&[
        "ADD", "ANY", "AT", "AVG", "BIT", "BOOLEAN", "BOTH", "CALL", "CASCADE", "CAST", "CHAR",
        "CLOSE", "COALESCE", "COMMIT", "CONNECT", "CONNECTION", "CONTINUE", "CURRENT", "CURSOR",
        "DEALLOCATE", "DEC", "DECIMAL", "DECLARE", "DESCRIBE", "DISCONNECT", "DOUBLE", "END",
        "ESCAPE", "EXCEPT", "EXEC", "EXECUTE", "EXPLAIN", "EXTERNAL", "FETCH", "FIRST", "FLOAT",
        "FOR", "FOUND", "FUNCTION", "GET", "GETCURRENTCONNECTION", "GLOBAL", "GO", "GOTO",
        "IDENTITY", "IMMEDIATE", "INDICATOR", "INOUT", "INPUT", "INT", "INTEGER", "INTERSECT",
        "LAST", "LEADING", "LOWER", "LTRIM", "MAX", "MIN", "NATIONAL", "NEXT", "NO", "NONE",
        "NULLIF", "NUMERIC", "OF", "ONLY", "OPEN", "OPTION", "OUT", "OVER", "OVERLAPS", "PAD",
        "PARTIAL", "PREPARE", "PRESERVE", "PRIOR", "PRIVILEGES", "PROCEDURE", "PUBLIC", "READ",
        "REAL", "RESTRICT", "REVOKE", "ROLLBACK", "ROWS", "RTRIM", "SCHEMA", "SCROLL", "SECOND",
        "SESSION_USER", "SMALLINT", "SOME", "SPACE", "SQL", "SQLCODE", "SQLERROR", "SQLSTATE",
        "SUBSTR", "SUM", "SYSTEM_USER", "TEMPORARY", "TIMEZONE_HOUR", "TIMEZONE_MINUTE",
        "TRAILING", "TRANSACTION", "TRANSLATE", "TRANSLATION", "TRIGGER", "TRIM", "UPPER",
        "USER", "USING", "VARCHAR", "VARYING", "VIEW", "WHENEVER", "WORK", "WRITE", "XML",
        "YEAR",
    ])
});

pub static HSQL: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    build(&[
        "ADMIN", "ARRAY", "BINARY", "BOOLEAN", "CALL", "CASCADE", "CAST", "CHAR", "CHARACTER",
        "CLOB", "CLOSE", "COALESCE", "COMMIT", "CONVERT", "CURSOR", "DAY", "DEC", "DECIMAL",
        "DECLARE", "DO", "DOUBLE", "ELSEIF", "EXCEPT", "EXECUTE", "FETCH", "FLOAT", "FOR",
        "FUNCTION", "GET", "HOUR", "IF", "INOUT", "INT", "INTEGER", "INTERSECT", "INTERVAL",
        "ITERATE", "LEADING", "LEAVE", "LIMIT", "LOOP", "MATCH", "MINUTE", "MONTH", "NATURAL",
        "NUMERIC", "OFFSET", "ONLY", "OUT", "POSITION", "PROCEDURE", "REAL", "REPEAT", "RETURN",
        "REVOKE", "ROLLBACK", "ROW", "ROWNUM", "ROWS", "SECOND", "SIGNAL", "SMALLINT", "SQL",
        "TIME", "TIMESTAMP", "TRAILING", "TRIGGER", "USER", "USING", "VALUE", "VARCHAR", "WHILE",
        "YEAR",
    ])
});

pub static FIREBIRD: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    build(&[
        "ACTIVE", "ADMIN", "AFTER", "ASCENDING", "AT", "AUTO", "BEFORE", "BEGIN", "BIGINT",
        "BLOB", "CAST", "CHAR", "CHARACTER", "COMMIT", "COMPUTED", "CONDITIONAL", "CONTAINING",
        "CURRENT_CONNECTION", "CURRENT_ROLE", "CURRENT_TRANSACTION", "CURRENT_USER", "CURSOR",
        "DATABASE", "DEBUG", "DEC", "DECIMAL", "DECLARE", "DESCENDING", "DO", "DOMAIN",
        "DOUBLE", "ENTRY_POINT", "ESCAPE", "EXCEPTION", "EXECUTE", "EXIT", "EXTERNAL", "FETCH",
        "FILE", "FILTER", "FLOAT", "FOR", "FUNCTION", "GDSCODE", "GENERATOR", "GEN_ID", "IF",
        "INACTIVE", "INPUT_TYPE", "INT", "INTEGER", "MANUAL", "MERGE", "MODULE_NAME", "NUMERIC",
        "OUTPUT_TYPE", "OVERFLOW", "PAGE", "PAGES", "PAGE_SIZE", "PARAMETER", "PASSWORD",
        "PLAN", "POSITION", "POST_EVENT", "PRECISION", "PROCEDURE", "PROTECTED", "RDB$DB_KEY",
        "RECORD_VERSION", "RECREATE", "RETAIN", "RETURNING_VALUES", "RETURNS", "REVOKE", "ROLE",
        "ROLLBACK", "ROW_COUNT", "ROWS", "SAVEPOINT", "SEGMENT", "SHADOW", "SHARED", "SINGULAR",
        "SMALLINT", "SNAPSHOT", "SORT", "SQLCODE", "STABILITY", "STARTING", "STARTS",
        "STATISTICS", "SUB_TYPE", "SUSPEND", "TIME", "TIMESTAMP", "TRIGGER", "USER", "USING",
        "VARCHAR", "VARIABLE", "VARYING", "WAIT", "WHILE", "WORK", "WRITE",
    ])
});

pub static MSSQL: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    build(&[
        "ADD", "ANY", "AUTHORIZATION", "BACKUP", "BEGIN", "BREAK", "BROWSE", "BULK", "CASCADE",
        "CAST", "CHECKPOINT", "CLOSE", "CLUSTERED", "COALESCE", "COLLATE", "COMMIT", "COMPUTE",
        "CONTAINS", "CONTAINSTABLE", "CONTINUE", "CONVERT", "CURRENT", "CURRENT_USER", "CURSOR",
        "DATABASE", "DBCC", "DEALLOCATE", "DECLARE", "DENY", "DISK", "DISTRIBUTED", "DUMP",
        "ERRLVL", "ESCAPE", "EXCEPT", "EXEC", "EXECUTE", "EXIT", "EXTERNAL", "FETCH", "FILE",
        "FILLFACTOR", "FOR", "FREETEXT", "FREETEXTTABLE", "FUNCTION", "GOTO", "HOLDLOCK",
        "IDENTITY", "IDENTITYCOL", "IDENTITY_INSERT", "IF", "INTERSECT", "KILL", "LINENO",
        "LOAD", "MERGE", "NATIONAL", "NOCHECK", "NONCLUSTERED", "OF", "OFF", "OFFSETS", "OPEN",
        "OPENDATASOURCE", "OPENQUERY", "OPENROWSET", "OPENXML", "OPTION", "OVER", "PERCENT",
        "PIVOT", "PLAN", "PRECISION", "PRINT", "PROC", "PROCEDURE", "PUBLIC", "RAISERROR",
        "READ", "READTEXT", "RECONFIGURE", "REPLICATION", "RESTORE", "RESTRICT", "RETURN",
        "REVERT", "REVOKE", "ROLLBACK", "ROWCOUNT", "ROWGUIDCOL", "RULE", "SAVE", "SCHEMA",
        "SECURITYAUDIT", "SESSION_USER", "SETUSER", "SHUTDOWN", "SOME", "STATISTICS",
        "SYSTEM_USER", "TABLESAMPLE", "TEXTSIZE", "TOP", "TRAN", "TRANSACTION", "TRIGGER",
        "TRUNCATE", "TSEQUAL", "UNPIVOT", "UPDATETEXT", "USE", "USER", "VARYING", "VIEW",
        "WAITFOR", "WHILE", "WRITETEXT",
    ])
});

pub static CASSANDRA: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    build(&[
        "ALLOW", "APPLY", "ASCII", "AUTHORIZE", "BATCH", "BEGIN", "BIGINT", "BLOB", "BOOLEAN",
        "COUNTER", "DECIMAL", "DESCRIBE", "ENTRIES", "EXECUTE", "FILTERING", "FROZEN", "IF",
        "INET", "INFINITY", "KEYSPACE", "KEYSPACES", "LIST", "LOGIN", "MAP", "MATERIALIZED",
        "MODIFY", "NAN", "NORECURSIVE", "NOSUPERUSER", "OF", "PASSWORD", "PERMISSION",
        "PERMISSIONS", "RENAME", "REVOKE", "SCHEMA", "SMALLINT", "SUPERUSER", "TEXT", "TIME",
        "TIMESTAMP", "TIMEUUID", "TINYINT", "TOKEN", "TRUNCATE", "TTL", "TUPLE", "UNLOGGED",
        "USE", "USER", "USERS", "USING", "UUID", "VARCHAR", "VARINT", "WRITETIME",
    ])
});

/// Case-insensitive membership check
pub fn is_reserved_in(set: &HashSet<&'static str>, identifier: &str) -> bool {
    set.contains(identifier.to_ascii_uppercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ansi_words_present_everywhere() {
        for set in [&ORACLE, &MYSQL, &POSTGRES, &SQLITE, &DERBY, &HSQL, &FIREBIRD, &MSSQL] {
            assert!(is_reserved_in(set, "select"));
            assert!(is_reserved_in(set, "Order"));
            assert!(!is_reserved_in(set, "customer_id"));
        }
    }

    #[test]
    fn test_vendor_specific_words() {
        assert!(is_reserved_in(&ORACLE, "rownum"));
        assert!(!is_reserved_in(&POSTGRES, "rownum"));
        assert!(is_reserved_in(&MYSQL, "limit"));
        assert!(is_reserved_in(&SQLITE, "autoincrement"));
        assert!(is_reserved_in(&CASSANDRA, "keyspace"));
    }
}
