use chrono::NaiveDate;
use enrollment_dashboard::config::Settings;
use enrollment_dashboard::data::{DataSources, TableCache};
use enrollment_dashboard::filter::{self, CourseFilter};
use enrollment_dashboard::{report, segmentation, views};

const ENROLLMENTS: &str = "\
idAluno;Curso1;Aluno Ativo;Data Matrícula;Primeiro Acesso;Último Acesso
1;Pedagogia;1;10/01/2024 09:00:00;11/01/2024 09:00:00;20/03/2024 09:00:00
2;Pedagogia;0;12/01/2024 09:00:00;;
3;Administração;1;02/02/2024 09:00:00;;
";

const DISCIPLINES: &str = "\
idAluno;Disciplina;Liberado a Partir De;Data Início;Data Término;Percentual Concluído;Nota de Aproveitamento Final;Último Acesso
1;Didática;01/03/2024 00:00:00;;;0;;
2;Didática;01/03/2024 00:00:00;;;0;;15/03/2024 10:00:00
1;Psicologia;01/03/2024 00:00:00;;;35;;15/03/2024 10:00:00
2;Psicologia;25/05/2024 00:00:00;;;0;;
1;Filosofia;01/02/2024 00:00:00;05/02/2024;20/02/2024;100;9;20/02/2024 10:00:00
3;Contabilidade;01/03/2024 00:00:00;;;10;;
";

fn cache(dir: &tempfile::TempDir) -> TableCache {
    let enrollments = dir.path().join("Cursos.csv");
    let disciplines = dir.path().join("Disciplinas.csv");
    std::fs::write(&enrollments, ENROLLMENTS).unwrap();
    std::fs::write(&disciplines, DISCIPLINES).unwrap();
    TableCache::new(DataSources {
        enrollments,
        disciplines,
        delimiter: b';',
    })
}

fn as_of() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

#[test]
fn course_filter_narrows_engagement() {
    let dir = tempfile::tempdir().unwrap();
    let tables = cache(&dir).get().unwrap();
    let settings = Settings::default();

    let all = segmentation::segment(&tables.disciplines, &settings, as_of());
    assert_eq!(all.summary.eligible, 4);
    assert_eq!(all.summary.not_started.count, 1);
    assert_eq!(all.summary.viewed_only.count, 1);
    assert_eq!(all.summary.abandoned.count, 2);

    let pedagogia = filter::apply(&tables, &CourseFilter::Course("Pedagogia".to_string()));
    let seg = segmentation::segment(&pedagogia.disciplines, &settings, as_of());
    assert_eq!(seg.summary.eligible, 3);
    assert_eq!(seg.summary.abandoned.count, 1);
    assert_eq!(seg.abandoned[0].name, "Psicologia");
    assert_eq!(seg.abandonment_buckets[3].count, 1);
    assert!((seg.summary.abandoned.percent - 100.0 / 3.0).abs() < 1e-9);
}

#[test]
fn full_report_renders_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let tables = cache(&dir).get().unwrap();
    let settings = Settings::default();

    let overview = views::overview(&tables.enrollments, &settings);
    let students = views::student_analysis(&tables.enrollments);
    let disciplines = views::discipline_analysis(&tables.disciplines, &settings);
    let engagement = segmentation::segment(&tables.disciplines, &settings, as_of());

    assert_eq!(overview.active_students, 2);
    assert_eq!(overview.inactive_students, 1);
    assert_eq!(disciplines.most_completed[0].name, "Filosofia");

    let text = report::build_report(&report::ReportInput {
        scope: CourseFilter::All.label(),
        as_of: as_of(),
        settings: &settings,
        overview: &overview,
        students: &students,
        disciplines: &disciplines,
        engagement: &engagement,
    });
    assert!(text.contains("Generated for all courses"));
    assert!(text.contains("1. Pedagogia: 2 enrollments"));
    assert!(text.contains("- Abandoned: 2 (50.0%)"));
    assert!(text.contains("- Enrollments by status: 2 active, 1 inactive"));
    assert!(text.contains("- 31-40%: 1"));
}
