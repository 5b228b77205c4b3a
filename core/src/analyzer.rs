//! Periodic correlation pass: groups today's RSSI streams by (class,
//! session date), runs the pairwise correlation engine on each group, and
//! closes the loop on attendance statuses.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, timeout};

use db::models::anomaly::AnomalyStatus;
use db::models::attendance::AttendanceStatus;
use db::repositories::{AttendanceRepository, RssiStreamRepository};
use util::AppError;

use crate::anomaly::AnomalyService;
use crate::clock::Clock;
use crate::correlation::{self, Point};

const MIN_SAMPLES_FOR_ANALYSIS: i64 = 10;
const MIN_GROUP_SIZE: usize = 2;
const CORRELATION_BUDGET: Duration = Duration::from_secs(10);

pub struct AnalyzerJob {
    streams: Arc<dyn RssiStreamRepository>,
    attendance: Arc<dyn AttendanceRepository>,
    anomalies: Arc<AnomalyService>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub groups_considered: usize,
    pub groups_skipped_too_small: usize,
    pub groups_timed_out: usize,
    pub pairs_flagged: usize,
}

impl AnalyzerJob {
    pub fn new(
        streams: Arc<dyn RssiStreamRepository>,
        attendance: Arc<dyn AttendanceRepository>,
        anomalies: Arc<AnomalyService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            streams,
            attendance,
            anomalies,
            clock,
        }
    }

    /// Runs a periodic tick loop until `shutdown` fires.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(None, None).await {
                        warn!("analyzer tick failed: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("analyzer shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One pass, optionally pinned to a single (class, date).
    pub async fn run_once(
        &self,
        class_id: Option<&str>,
        session_date: Option<NaiveDate>,
    ) -> Result<AnalysisSummary, AppError> {
        let since = self.clock.now() - chrono::Duration::hours(24);
        let streams = self
            .streams
            .find_for_analysis(class_id, session_date, since, MIN_SAMPLES_FOR_ANALYSIS)
            .await
            .map_err(AppError::from)?;

        let mut groups: HashMap<(String, NaiveDate), Vec<(String, Vec<Point>)>> = HashMap::new();
        for stream in streams {
            let points: Vec<Point> = stream
                .samples
                .iter()
                .map(|s| Point {
                    timestamp: s.timestamp,
                    rssi: s.rssi,
                })
                .collect();
            groups
                .entry((stream.class_id.clone(), stream.session_date))
                .or_default()
                .push((stream.student_id.clone(), points));
        }

        let mut summary = AnalysisSummary::default();
        for ((class_id, session_date), members) in groups {
            summary.groups_considered += 1;
            if members.len() < MIN_GROUP_SIZE {
                summary.groups_skipped_too_small += 1;
                continue;
            }

            let student_ids: Vec<String> = members.iter().map(|(s, _)| s.clone()).collect();
            let series: Vec<Vec<Point>> = members.into_iter().map(|(_, p)| p).collect();

            let sweep = match timeout(CORRELATION_BUDGET, tokio::task::spawn_blocking(move || {
                correlation::analyze_all_pairs(&series)
            }))
            .await
            {
                Ok(Ok(entries)) => entries,
                Ok(Err(join_err)) => {
                    warn!("correlation sweep for {class_id}/{session_date} panicked: {join_err}");
                    continue;
                }
                Err(_elapsed) => {
                    warn!("correlation sweep for {class_id}/{session_date} exceeded its CPU budget, skipping group");
                    summary.groups_timed_out += 1;
                    continue;
                }
            };

            let mut proxy_students: HashSet<String> = HashSet::new();
            let mut pending_students: HashSet<String> = HashSet::new();

            for entry in sweep.iter().filter(|e| e.result.verdict.is_suspicious()) {
                let Some(correlation) = entry.result.correlation else {
                    continue;
                };
                let Some(severity) = entry.result.severity else {
                    continue;
                };
                let Some(reason) = entry.result.reason else {
                    continue;
                };
                let student_a = &student_ids[entry.index_a];
                let student_b = &student_ids[entry.index_b];

                summary.pairs_flagged += 1;
                let row = db::retry::with_retry(|| {
                    self.anomalies.upsert_flagged_pair(
                        &class_id,
                        session_date,
                        student_a,
                        student_b,
                        correlation,
                        severity,
                        reason,
                    )
                })
                .await
                .map_err(AppError::from)?;

                match row.status {
                    AnomalyStatus::ConfirmedProxy => {
                        proxy_students.insert(row.student_id_1.clone());
                        proxy_students.insert(row.student_id_2.clone());
                    }
                    AnomalyStatus::Pending => {
                        pending_students.insert(row.student_id_1.clone());
                        pending_students.insert(row.student_id_2.clone());
                    }
                    AnomalyStatus::FalsePositive => {}
                }
            }

            self.close_loop_on_attendance(&class_id, session_date, &proxy_students, &pending_students)
                .await?;
        }

        Ok(summary)
    }

    async fn close_loop_on_attendance(
        &self,
        class_id: &str,
        session_date: NaiveDate,
        proxy_students: &HashSet<String>,
        pending_students: &HashSet<String>,
    ) -> Result<(), AppError> {
        let provisional = self
            .attendance
            .list_provisional_for_group(class_id, session_date)
            .await
            .map_err(AppError::from)?;

        let now = self.clock.now();
        for record in provisional {
            if record.status != AttendanceStatus::Provisional {
                continue;
            }
            if proxy_students.contains(&record.student_id) {
                db::retry::with_retry(|| {
                    self.attendance
                        .cancel_provisional(record.id, now, "Proxy detected by automation")
                })
                .await
                .map_err(AppError::from)?;
            } else if pending_students.contains(&record.student_id) {
                // Awaits human review; left provisional.
            } else {
                db::retry::with_retry(|| self.attendance.confirm(record.id, now))
                    .await
                    .map_err(AppError::from)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration as ChronoDuration, Utc};
    use db::models::anomaly::AnomalyStatus;
    use db::models::attendance::AttendanceStatus;
    use db::models::rssi_stream::Sample;
    use db::repositories::{
        AttendanceRepository, NewAttendance, SeaOrmAnomalyRepository, SeaOrmAttendanceRepository,
        SeaOrmRssiStreamRepository,
    };
    use db::testing::setup_test_db;

    use crate::anomaly::AnomalyService;
    use crate::clock::FixedClock;

    use super::*;

    fn correlated_samples(base: chrono::DateTime<Utc>) -> Vec<Sample> {
        let pattern = [-60, -58, -62, -59, -61, -60, -57, -63, -58, -61, -60, -59];
        pattern
            .iter()
            .enumerate()
            .map(|(i, &rssi)| Sample {
                timestamp: base + ChronoDuration::seconds(i as i64 * 5),
                rssi,
                original_timestamp: None,
                clock_offset_ms: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn stationary_proxy_pair_is_flagged_and_attendance_cancelled() {
        let now = Utc::now();
        let db = setup_test_db().await;
        let attendance = Arc::new(SeaOrmAttendanceRepository::new(db.clone()));
        let streams = Arc::new(SeaOrmRssiStreamRepository::new(db.clone()));
        let anomalies_repo = Arc::new(SeaOrmAnomalyRepository::new(db));
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now));

        let anomalies = Arc::new(AnomalyService::new(anomalies_repo, attendance.clone(), clock.clone()));
        let analyzer = AnalyzerJob::new(streams.clone(), attendance.clone(), anomalies.clone(), clock.clone());

        let session_date = clock.today();
        for (student_id, device_id) in [("S1", "D1"), ("S2", "D2")] {
            attendance
                .create_provisional(NewAttendance {
                    student_id: student_id.into(),
                    class_id: "C1".into(),
                    session_date,
                    device_id: device_id.into(),
                    check_in_time: now,
                    rssi: Some(-60),
                    beacon_major: None,
                    beacon_minor: None,
                })
                .await
                .unwrap();
            streams
                .append(student_id, "C1", session_date, correlated_samples(now), now, None)
                .await
                .unwrap();
        }

        let summary = analyzer.run_once(None, None).await.unwrap();
        assert_eq!(summary.pairs_flagged, 1);

        let flagged = anomalies.list(Some("C1"), Some(session_date), None).await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].status, AnomalyStatus::ConfirmedProxy);

        for student_id in ["S1", "S2"] {
            let record = attendance
                .find_by_student_class_day(student_id, "C1", session_date)
                .await
                .unwrap()
                .expect("attendance still exists");
            assert_eq!(record.status, AttendanceStatus::Cancelled);
        }
    }
}
