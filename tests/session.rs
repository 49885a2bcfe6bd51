use std::{
    fs,
    sync::{Arc, Mutex},
};

use futures_util::TryStreamExt;
use sqlx::{Connection, Row, SqliteConnection};
use sqlx_mapper::{Error, Input, MapperConfig, QueryLogger, Record, SqlSession, Value, build};

const USERS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mapper name="users">
    <insert id="insertAll"><![CDATA[
        INSERT INTO users (id, name, age) VALUES
        <foreach item="u" collection="slice" separator=",">(#{id}, #{name}, #{age})</foreach>
    ]]></insert>
    <select id="search"><![CDATA[
        SELECT id, name, age FROM users WHERE 1 = 1
        <if test="name != null">AND name = #{name}</if>
        <if test="min_age != null">AND age >= #{min_age}</if>
        ORDER BY id
    ]]></select>
    <select id="byId">SELECT id, name, age FROM users WHERE id = #{id}</select>
    <update id="setAge">UPDATE users SET age = #{age} WHERE id = #{id}</update>
    <delete id="byIds"><![CDATA[
        DELETE FROM users WHERE id IN
        <foreach item="id" collection="ids" open="(" separator="," close=")">#{id}</foreach>
    ]]></delete>
</mapper>"#;

#[derive(Record, sqlx::FromRow, Debug, Clone, PartialEq)]
struct User {
    id: i64,
    name: Option<String>,
    age: i64,
}

#[derive(Record)]
struct Search<'a> {
    name: Option<&'a str>,
    min_age: Option<i64>,
}

#[derive(Record)]
struct Key {
    id: i64,
}

#[derive(Record)]
struct SetAge {
    id: i64,
    age: i64,
}

#[derive(Record)]
struct Ids {
    ids: Vec<i64>,
}

/// Keeps every `rows_fetched` event as `(count, rendered rows)`.
#[derive(Clone, Default)]
struct RowRecorder {
    debug: bool,
    events: Arc<Mutex<Vec<(usize, Option<String>)>>>,
}

impl RowRecorder {
    fn take(&self) -> Vec<(usize, Option<String>)> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl QueryLogger for RowRecorder {
    fn debug_enabled(&self) -> bool {
        self.debug
    }

    fn rows_fetched(&self, count: usize, rows: Option<&sqlx_mapper::Projection>) {
        self.events
            .lock()
            .unwrap()
            .push((count, rows.map(ToString::to_string)));
    }
}

fn user(id: i64, name: Option<&str>, age: i64) -> User {
    User {
        id,
        name: name.map(str::to_string),
        age,
    }
}

async fn setup(dir: &tempfile::TempDir) -> Result<(SqlSession, SqliteConnection), Error> {
    fs::write(dir.path().join("users.xml"), USERS)?;
    let session = SqlSession::new(&MapperConfig::new(dir.path(), ["users.xml"]))?;

    let mut conn = SqliteConnection::connect("sqlite::memory:").await?;
    sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER NOT NULL)")
        .execute(&mut conn)
        .await?;

    let users = vec![
        user(1, Some("alice"), 30),
        user(2, Some("bob"), 17),
        user(3, None, 45),
    ];
    let result = session
        .insert("users", "insertAll", Input::records(&users), &mut conn)
        .await?;
    assert_eq!(result.rows_affected(), 3);
    Ok((session, conn))
}

#[tokio::test]
async fn test_select_list() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let (session, mut conn) = setup(&dir).await?;

    let all: Vec<User> = session
        .select_list("users", "search", Input::Null, &mut conn)
        .await?;
    assert_eq!(all.len(), 3);
    assert_eq!(all[2], user(3, None, 45));

    let search = Search {
        name: None,
        min_age: Some(18),
    };
    let adults: Vec<User> = session
        .select_list("users", "search", Input::record(&search), &mut conn)
        .await?;
    assert_eq!(
        adults.iter().map(|u| u.id).collect::<Vec<_>>(),
        vec![1, 3]
    );

    let search = Search {
        name: Some("bob"),
        min_age: None,
    };
    let bob: Vec<User> = session
        .select_list("users", "search", Input::record(&search), &mut conn)
        .await?;
    assert_eq!(bob, vec![user(2, Some("bob"), 17)]);
    Ok(())
}

#[tokio::test]
async fn test_select_one() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let (session, mut conn) = setup(&dir).await?;

    let alice: User = session
        .select_one("users", "byId", Input::record(&Key { id: 1 }), &mut conn)
        .await?;
    assert_eq!(alice.name.as_deref(), Some("alice"));

    let missing: Result<User, Error> = session
        .select_one("users", "byId", Input::record(&Key { id: 9 }), &mut conn)
        .await;
    assert!(matches!(
        missing,
        Err(Error::SqlxError(sqlx::Error::RowNotFound))
    ));

    let missing: Option<User> = session
        .select_optional("users", "byId", Input::record(&Key { id: 9 }), &mut conn)
        .await?;
    assert!(missing.is_none());
    Ok(())
}

#[tokio::test]
async fn test_update_and_delete() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let (session, mut conn) = setup(&dir).await?;

    let result = session
        .update(
            "users",
            "setAge",
            Input::record(&SetAge { id: 2, age: 18 }),
            &mut conn,
        )
        .await?;
    assert_eq!(result.rows_affected(), 1);

    let bob: User = session
        .select_one("users", "byId", Input::record(&Key { id: 2 }), &mut conn)
        .await?;
    assert_eq!(bob.age, 18);

    let result = session
        .delete(
            "users",
            "byIds",
            Input::record(&Ids { ids: vec![1, 3, 7] }),
            &mut conn,
        )
        .await?;
    assert_eq!(result.rows_affected(), 2);

    let rest: Vec<User> = session
        .select_list("users", "search", Input::Null, &mut conn)
        .await?;
    assert_eq!(rest, vec![user(2, Some("bob"), 18)]);
    Ok(())
}

#[tokio::test]
async fn test_unknown_statement() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let (session, mut conn) = setup(&dir).await?;
    let err = session
        .delete("users", "search", Input::Null, &mut conn)
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    Ok(())
}

#[tokio::test]
async fn test_execute_built_query() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let (_session, mut conn) = setup(&dir).await?;

    let ids = [2_i64, 3];
    let query = build(
        r#"SELECT id, name, age FROM users WHERE id IN
            <foreach item="id" collection="slice" open="(" separator="," close=")">#{id}</foreach>
            ORDER BY id DESC"#,
        Input::records(&ids),
    )?;
    assert_eq!(query.args(), &[Value::Int(2), Value::Int(3)]);

    let users: Vec<User> = query
        .to_execute::<sqlx::Sqlite>()?
        .fetch_all_as(&mut conn)
        .await?;
    assert_eq!(users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![3, 2]);

    let none = build("SELECT id, name, age FROM users WHERE name IS #{name}", Input::Null)?;
    assert_eq!(none.args(), &[Value::Null]);
    let nameless: User = none
        .to_execute::<sqlx::Sqlite>()?
        .fetch_one_as(&mut conn)
        .await?;
    assert_eq!(nameless.id, 3);
    Ok(())
}

#[tokio::test]
async fn test_rows_fetched_logging() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let (session, mut conn) = setup(&dir).await?;

    let recorder = RowRecorder {
        debug: true,
        ..Default::default()
    };
    let logged = session.clone().set_logger(recorder.clone());

    let _: Vec<User> = logged
        .select_list("users", "search", Input::Null, &mut conn)
        .await?;
    let _: User = logged
        .select_one("users", "byId", Input::record(&Key { id: 1 }), &mut conn)
        .await?;
    let missing: Option<User> = logged
        .select_optional("users", "byId", Input::record(&Key { id: 9 }), &mut conn)
        .await?;
    assert!(missing.is_none());

    assert_eq!(
        recorder.take(),
        vec![
            (
                3,
                Some("[{1, alice, 30}, {2, bob, 17}, {3, null, 45}]".to_string())
            ),
            (1, Some("[{1, alice, 30}]".to_string())),
            (0, Some("[]".to_string())),
        ]
    );

    let quiet = RowRecorder::default();
    let _: Vec<User> = session
        .clone()
        .set_logger(quiet.clone())
        .select_list("users", "search", Input::Null, &mut conn)
        .await?;
    assert_eq!(quiet.take(), vec![(3, None)]);
    Ok(())
}

#[tokio::test]
async fn test_fetch_raw_rows() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let (_session, mut conn) = setup(&dir).await?;

    let all = build("SELECT id FROM users ORDER BY id", Input::Null)?;
    let rows = all.to_execute::<sqlx::Sqlite>()?.fetch_all(&mut conn).await?;
    assert_eq!(
        rows.iter().map(|r| r.get::<i64, _>("id")).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    let streamed: Vec<_> = all
        .to_execute::<sqlx::Sqlite>()?
        .fetch(&mut conn)
        .try_collect()
        .await?;
    assert_eq!(streamed.len(), 3);
    assert_eq!(streamed[2].get::<i64, _>("id"), 3);

    let by_name = build(
        "SELECT id FROM users WHERE name = #{name}",
        Input::Environment(sqlx_mapper::Environment::new().with("name", "bob")),
    )?;
    let row = by_name
        .to_execute::<sqlx::Sqlite>()?
        .fetch_one(&mut conn)
        .await?;
    assert_eq!(row.get::<i64, _>("id"), 2);

    let nobody = build(
        "SELECT id FROM users WHERE name = #{name}",
        Input::Environment(sqlx_mapper::Environment::new().with("name", "zed")),
    )?;
    let row = nobody
        .to_execute::<sqlx::Sqlite>()?
        .fetch_optional(&mut conn)
        .await?;
    assert!(row.is_none());
    Ok(())
}
