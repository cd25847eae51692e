use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{BookingState, BookingStatus, Conversation, Reservation, ReservationStatus};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

fn parse_dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).unwrap_or_else(|e| {
        tracing::warn!(value = s, error = %e, "unreadable stored timestamp, using current time");
        Utc::now().naive_utc()
    })
}

// ── Conversations ──

pub fn get_conversation(conn: &Connection, id: &str) -> anyhow::Result<Option<Conversation>> {
    let now = fmt(&Utc::now().naive_utc());
    let mut stmt = conn.prepare(
        "SELECT id, state, data, last_activity, expires_at FROM conversations WHERE id = ?1 AND expires_at > ?2",
    )?;

    let result = stmt.query_row(params![id, now], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    });

    match result {
        Ok((id, status_str, data, last_activity_str, expires_at_str)) => {
            let mut state: BookingState = serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!(conversation = %id, error = %e, "unreadable conversation data, starting over");
                BookingState::default()
            });
            state.status = BookingStatus::parse(&status_str);

            Ok(Some(Conversation {
                id,
                state,
                last_activity: parse_dt(&last_activity_str),
                expires_at: parse_dt(&expires_at_str),
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn save_conversation(conn: &Connection, conv: &Conversation) -> anyhow::Result<()> {
    let data = serde_json::to_string(&conv.state)?;

    conn.execute(
        "INSERT INTO conversations (id, state, data, last_activity, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
           state = excluded.state,
           data = excluded.data,
           last_activity = excluded.last_activity,
           expires_at = excluded.expires_at",
        params![
            conv.id,
            conv.state.status.as_str(),
            data,
            fmt(&conv.last_activity),
            fmt(&conv.expires_at),
        ],
    )?;
    Ok(())
}

pub fn delete_conversation(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

pub fn expire_old_conversations(conn: &Connection) -> anyhow::Result<usize> {
    let now = fmt(&Utc::now().naive_utc());
    let count = conn.execute("DELETE FROM conversations WHERE expires_at <= ?1", params![now])?;
    Ok(count)
}

// ── Reservations ──

pub fn create_reservation(conn: &Connection, reservation: &Reservation) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO reservations (id, conversation_id, customer_name, service, date_time, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            reservation.id,
            reservation.conversation_id,
            reservation.customer_name,
            reservation.service,
            fmt(&reservation.date_time),
            reservation.status.as_str(),
            fmt(&reservation.created_at),
            fmt(&reservation.updated_at),
        ],
    )?;
    Ok(())
}

pub fn is_slot_taken(conn: &Connection, service: &str, date_time: &NaiveDateTime) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM reservations WHERE service = ?1 AND date_time = ?2 AND status != 'cancelled'",
        params![service, fmt(date_time)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Start times already held for `service` on `date`.
pub fn taken_times(conn: &Connection, service: &str, date: NaiveDate) -> anyhow::Result<Vec<NaiveTime>> {
    let day_start = fmt(&date.and_time(NaiveTime::MIN));
    let day_end = format!("{} 23:59:59", date.format("%Y-%m-%d"));

    let mut stmt = conn.prepare(
        "SELECT date_time FROM reservations
         WHERE service = ?1 AND date_time >= ?2 AND date_time <= ?3 AND status != 'cancelled'
         ORDER BY date_time ASC",
    )?;
    let rows = stmt.query_map(params![service, day_start, day_end], |row| row.get::<_, String>(0))?;

    let mut times = vec![];
    for row in rows {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&row?, DATETIME_FORMAT) {
            times.push(dt.time());
        }
    }
    Ok(times)
}

pub fn get_all_reservations(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Reservation>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            "SELECT id, conversation_id, customer_name, service, date_time, status, created_at, updated_at \
             FROM reservations WHERE status = ?1 ORDER BY date_time DESC LIMIT ?2"
                .to_string(),
            vec![
                Box::new(status.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            "SELECT id, conversation_id, customer_name, service, date_time, status, created_at, updated_at \
             FROM reservations ORDER BY date_time DESC LIMIT ?1"
                .to_string(),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), parse_reservation_row)?;

    let mut reservations = vec![];
    for row in rows {
        reservations.push(row?);
    }
    Ok(reservations)
}

pub fn get_reservation_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Reservation>> {
    let result = conn.query_row(
        "SELECT id, conversation_id, customer_name, service, date_time, status, created_at, updated_at \
         FROM reservations WHERE id = ?1",
        params![id],
        parse_reservation_row,
    );

    match result {
        Ok(reservation) => Ok(Some(reservation)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_reservation_status(
    conn: &Connection,
    id: &str,
    status: ReservationStatus,
) -> anyhow::Result<bool> {
    let now = fmt(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE reservations SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    Ok(count > 0)
}

fn parse_reservation_row(row: &rusqlite::Row) -> rusqlite::Result<Reservation> {
    let date_time: String = row.get(4)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok(Reservation {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        customer_name: row.get(2)?,
        service: row.get(3)?,
        date_time: parse_dt(&date_time),
        status: ReservationStatus::parse(&status),
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
    })
}
